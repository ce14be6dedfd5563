//! Durable references to VM-resident values.

use std::fmt;

use crate::abi::RawHandle;

/// A pinned reference to a VM-resident value.
///
/// While a handle exists, the collector will not reclaim the value it refers
/// to. Handles are created by pinning a slot (`get_slot_handle`) or compiling
/// a call signature (`make_call_handle`) and destroyed only by
/// `release_handle`, which takes the handle by value — code that tries to use
/// a released handle does not compile.
///
/// Dropping a handle without releasing it leaks the pin until VM teardown.
/// The host is solely responsible for balancing pin/release pairs; there is
/// no automatic tracking across early returns.
#[must_use = "dropping a handle leaks its pin; release it through the session"]
pub struct Handle {
    raw: RawHandle,
}

impl Handle {
    pub(crate) fn new(raw: RawHandle) -> Handle {
        Handle { raw }
    }

    /// The raw ABI token. Only meaningful to the session that created it.
    pub fn raw(&self) -> RawHandle {
        self.raw
    }

    /// Consumes the wrapper without running the leak warning; used by
    /// `release_handle` after the pin is gone.
    pub(crate) fn into_raw(self) -> RawHandle {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.raw.0).finish()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        tracing::debug!(
            handle = self.raw.0,
            "handle dropped without release; its pin persists until VM teardown"
        );
    }
}
