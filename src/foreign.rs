//! Address-keyed registry bridging host payloads to VM foreign instances.
//!
//! The VM owns the instance; the host owns the payload. Entries are created
//! inside an allocate callback (`set_slot_new_foreign`) and removed when the
//! collector finalizes the instance. Keys are the VM-assigned addresses —
//! stable integers, never raw pointers on the host side.

use std::any::Any;
use std::collections::HashMap;

use crate::abi::ForeignAddr;
use crate::config::FinalizeFn;

pub(crate) struct ForeignEntry {
    pub payload: Box<dyn Any>,
    /// The embedder's finalizer for this instance's class, if any. Captured
    /// at allocation time so finalization needs no class lookup.
    pub finalize: Option<FinalizeFn>,
}

/// Live foreign payloads of one session, keyed by instance address.
#[derive(Default)]
pub(crate) struct ForeignRegistry {
    entries: HashMap<ForeignAddr, ForeignEntry>,
}

impl ForeignRegistry {
    pub fn insert(&mut self, addr: ForeignAddr, payload: Box<dyn Any>, finalize: Option<FinalizeFn>) {
        let previous = self.entries.insert(addr, ForeignEntry { payload, finalize });
        assert!(
            previous.is_none(),
            "foreign registry already holds an entry for {addr:?}"
        );
    }

    pub fn remove(&mut self, addr: ForeignAddr) -> Option<ForeignEntry> {
        self.entries.remove(&addr)
    }

    /// The payload bound to `addr`, downcast to its concrete type. Used by
    /// method dispatch to recover the host object behind `this`.
    pub fn get<T: Any>(&self, addr: ForeignAddr) -> Option<&T> {
        self.entries
            .get(&addr)
            .and_then(|entry| entry.payload.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, addr: ForeignAddr) -> Option<&mut T> {
        self.entries
            .get_mut(&addr)
            .and_then(|entry| entry.payload.downcast_mut::<T>())
    }

    pub fn contains(&self, addr: ForeignAddr) -> bool {
        self.entries.contains_key(&addr)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
