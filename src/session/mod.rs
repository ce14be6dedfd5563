//! One VM instance's lifetime, configuration, and host-side state.
//!
//! A [`Session`] owns the VM behind the ABI seam plus everything the host
//! keeps on its side of the boundary: the foreign registry, the interned
//! foreign method/class tables, the pending-output line buffer, the runtime
//! error collector, and the pending-import table. Sessions share nothing;
//! each is fully independent.
//!
//! All operations live on [`Caller`] — the view handed to foreign methods —
//! and `Session` delegates to it, so host code and callback code go through
//! one implementation.

mod caller;
mod handle;

pub use caller::Caller;
pub use handle::Handle;

use std::any::Any;

use crate::abi::{ClassKey, ForeignAddr, InterpretOutcome, SlotType, VmAbi};
use crate::bridge::{ImportState, ImportTable};
use crate::config::{Config, ForeignClassMethods, ForeignMethod};
use crate::dispatch::{Dispatch, ErrorCollector, OutputBuffer};
use crate::foreign::ForeignRegistry;

/// One allocate callback on the stack. Re-entrant allocation nests: an
/// allocate callback may interpret source that constructs further foreign
/// instances, so the exactly-once bookkeeping is per frame, not per session.
pub(crate) struct AllocFrame {
    pub class: ClassKey,
    /// Whether this frame's callback has installed its instance yet.
    pub installed: bool,
}

/// Host-side state the dispatch layer and the caller both work against.
#[derive(Default)]
pub(crate) struct SessionState {
    pub foreign: ForeignRegistry,
    /// Foreign methods interned at bind time; the VM holds indices into this.
    pub methods: Vec<ForeignMethod>,
    /// Foreign class bindings interned at bind time.
    pub classes: Vec<ForeignClassMethods>,
    /// Allocate callbacks currently running, innermost last.
    pub allocating: Vec<AllocFrame>,
    pub out: OutputBuffer,
    pub errors: ErrorCollector,
    pub imports: ImportTable,
}

/// A single virtual machine plus the host state bridging to it.
pub struct Session {
    vm: Box<dyn VmAbi>,
    config: Config,
    state: SessionState,
    disposed: bool,
}

impl Session {
    /// Wraps a VM instance with the given callback configuration.
    pub fn new(vm: Box<dyn VmAbi>, config: Config) -> Session {
        Session {
            vm,
            config,
            state: SessionState::default(),
            disposed: false,
        }
    }

    fn caller(&mut self) -> Caller<'_> {
        assert!(!self.disposed, "session used after free");
        Caller::new(&mut *self.vm, &mut self.state, &self.config)
    }

    // Lifecycle.

    pub fn interpret(&mut self, module: &str, source: &str) -> InterpretOutcome {
        self.caller().interpret(module, source)
    }

    pub fn call(&mut self, handle: &Handle) -> InterpretOutcome {
        self.caller().call(handle)
    }

    pub fn make_call_handle(&mut self, signature: &str) -> Handle {
        self.caller().make_call_handle(signature)
    }

    pub fn release_handle(&mut self, handle: Handle) {
        self.caller().release_handle(handle);
    }

    pub fn collect_garbage(&mut self) {
        self.caller().collect_garbage();
    }

    pub fn version_number(&mut self) -> i32 {
        self.caller().version_number()
    }

    /// Disposes of the VM instance and the host state atomically: flushes any
    /// trailing output fragment, finalizes remaining foreign instances, and
    /// clears the registry so no dangling entries survive. Idempotent; also
    /// runs on drop. Fibers still parked on pending imports are simply torn
    /// down with the VM.
    pub fn free(&mut self) {
        if self.disposed {
            return;
        }
        self.state.out.flush(&*self.config.write);
        {
            let mut hooks = Dispatch::new(&self.config, &mut self.state);
            self.vm.dispose(&mut hooks);
        }
        self.state.foreign.clear();
        self.state.imports.clear();
        self.disposed = true;
        tracing::debug!("session disposed");
    }

    // Slot protocol; see Caller for the contract on each operation.

    pub fn get_slot_count(&mut self) -> usize {
        self.caller().get_slot_count()
    }

    pub fn ensure_slots(&mut self, count: usize) {
        self.caller().ensure_slots(count);
    }

    pub fn get_slot_type(&mut self, slot: usize) -> SlotType {
        self.caller().get_slot_type(slot)
    }

    pub fn get_slot_bool(&mut self, slot: usize) -> bool {
        self.caller().get_slot_bool(slot)
    }

    pub fn get_slot_double(&mut self, slot: usize) -> f64 {
        self.caller().get_slot_double(slot)
    }

    pub fn get_slot_bytes(&mut self, slot: usize) -> Vec<u8> {
        self.caller().get_slot_bytes(slot).to_vec()
    }

    pub fn get_slot_string(&mut self, slot: usize) -> String {
        self.caller().get_slot_string(slot).to_string()
    }

    pub fn get_slot_handle(&mut self, slot: usize) -> Handle {
        self.caller().get_slot_handle(slot)
    }

    /// Borrows the foreign payload in `slot` for the duration of `with`.
    pub fn with_slot_foreign<T: Any, R>(&mut self, slot: usize, with: impl FnOnce(&mut T) -> R) -> R {
        let mut caller = self.caller();
        with(caller.get_slot_foreign_mut::<T>(slot))
    }

    pub fn set_slot_bool(&mut self, slot: usize, value: bool) {
        self.caller().set_slot_bool(slot, value);
    }

    pub fn set_slot_double(&mut self, slot: usize, value: f64) {
        self.caller().set_slot_double(slot, value);
    }

    pub fn set_slot_bytes(&mut self, slot: usize, bytes: &[u8]) {
        self.caller().set_slot_bytes(slot, bytes);
    }

    pub fn set_slot_string(&mut self, slot: usize, text: &str) {
        self.caller().set_slot_string(slot, text);
    }

    pub fn set_slot_null(&mut self, slot: usize) {
        self.caller().set_slot_null(slot);
    }

    pub fn set_slot_handle(&mut self, slot: usize, handle: &Handle) {
        self.caller().set_slot_handle(slot, handle);
    }

    pub fn set_slot_new_list(&mut self, slot: usize) {
        self.caller().set_slot_new_list(slot);
    }

    pub fn set_slot_new_map(&mut self, slot: usize) {
        self.caller().set_slot_new_map(slot);
    }

    pub fn set_slot_new_foreign(
        &mut self,
        slot: usize,
        class_slot: usize,
        payload: Box<dyn Any>,
    ) -> ForeignAddr {
        self.caller().set_slot_new_foreign(slot, class_slot, payload)
    }

    pub fn get_list_count(&mut self, slot: usize) -> usize {
        self.caller().get_list_count(slot)
    }

    pub fn get_list_element(&mut self, list_slot: usize, index: i64, element_slot: usize) {
        self.caller().get_list_element(list_slot, index, element_slot);
    }

    pub fn set_list_element(&mut self, list_slot: usize, index: i64, element_slot: usize) {
        self.caller().set_list_element(list_slot, index, element_slot);
    }

    pub fn insert_in_list(&mut self, list_slot: usize, index: i64, element_slot: usize) {
        self.caller().insert_in_list(list_slot, index, element_slot);
    }

    pub fn get_map_count(&mut self, slot: usize) -> usize {
        self.caller().get_map_count(slot)
    }

    pub fn get_map_contains_key(&mut self, map_slot: usize, key_slot: usize) -> bool {
        self.caller().get_map_contains_key(map_slot, key_slot)
    }

    pub fn get_map_value(&mut self, map_slot: usize, key_slot: usize, value_slot: usize) {
        self.caller().get_map_value(map_slot, key_slot, value_slot);
    }

    pub fn set_map_value(&mut self, map_slot: usize, key_slot: usize, value_slot: usize) {
        self.caller().set_map_value(map_slot, key_slot, value_slot);
    }

    pub fn remove_map_value(&mut self, map_slot: usize, key_slot: usize, removed_value_slot: usize) {
        self.caller()
            .remove_map_value(map_slot, key_slot, removed_value_slot);
    }

    pub fn get_variable(&mut self, module: &str, name: &str, slot: usize) {
        self.caller().get_variable(module, name, slot);
    }

    pub fn has_variable(&mut self, module: &str, name: &str) -> bool {
        self.caller().has_variable(module, name)
    }

    pub fn has_module(&mut self, module: &str) -> bool {
        self.caller().has_module(module)
    }

    pub fn abort_fiber(&mut self, slot: usize) {
        self.caller().abort_fiber(slot);
    }

    // Module resolution bridge.

    /// Finishes one pending import with an externally obtained result. Most
    /// embedders use [`settle`](Session::settle) instead and let the session
    /// drive the loader futures itself.
    pub fn complete_import(
        &mut self,
        name: &str,
        result: Result<String, String>,
    ) -> InterpretOutcome {
        self.caller().complete_import(name, result)
    }

    /// Awaits every pending loader future and completes its import, looping
    /// until no import is left in flight (resumed modules may import more
    /// pending modules of their own).
    pub async fn settle(&mut self) {
        loop {
            let mut names = self.state.imports.loading();
            if names.is_empty() {
                break;
            }
            names.sort();
            for name in names {
                let Some(future) = self.state.imports.take_future(&name) else {
                    continue;
                };
                let result = future.await;
                self.complete_import(&name, result);
            }
        }
    }

    /// Canonical names of imports still waiting on their loader.
    pub fn pending_imports(&self) -> Vec<String> {
        self.state.imports.loading()
    }

    /// Lifecycle state of a name that went through the pending-load path.
    pub fn import_state(&self, name: &str) -> Option<ImportState> {
        self.state.imports.state(name)
    }

    /// Number of live foreign payloads in the registry.
    pub fn foreign_count(&self) -> usize {
        self.state.foreign.len()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.free();
    }
}
