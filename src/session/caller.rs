//! The re-entrant operation surface shared by host code and callbacks.
//!
//! Foreign methods receive a [`Caller`]: the same slot, handle, and lifecycle
//! operations the owning [`Session`](crate::session::Session) exposes, built
//! over a reborrow of the session's VM and state. Callbacks routinely call
//! back into slot operations — and may even interpret more source — so every
//! operation here is safe to use from inside VM-initiated activity.
//!
//! Slot preconditions are contract, not recoverable errors: the index must be
//! in range (`ensure_slots` first) and the slot must hold a value of the
//! matching type (`get_slot_type` when uncertain). Violations panic.

use std::any::Any;

use crate::abi::{ForeignAddr, InterpretOutcome, SlotType, VmAbi};
use crate::bridge::{self, ImportState};
use crate::config::Config;
use crate::dispatch::Dispatch;
use crate::error::ErrorReport;
use crate::session::{Handle, SessionState};

pub struct Caller<'a> {
    vm: &'a mut dyn VmAbi,
    state: &'a mut SessionState,
    config: &'a Config,
}

impl<'a> Caller<'a> {
    pub(crate) fn new(
        vm: &'a mut dyn VmAbi,
        state: &'a mut SessionState,
        config: &'a Config,
    ) -> Caller<'a> {
        Caller { vm, state, config }
    }

    fn check_slot(&self, slot: usize) {
        let count = self.vm.get_slot_count();
        assert!(slot < count, "slot {slot} out of range (slot count {count})");
    }

    // Lifecycle.

    /// Runs `source` in a new fiber in the context of resolved `module`.
    /// Returns promptly even when the script parks itself on a pending
    /// import.
    pub fn interpret(&mut self, module: &str, source: &str) -> InterpretOutcome {
        let outcome = {
            let mut hooks = Dispatch::new(self.config, self.state);
            self.vm.interpret(&mut hooks, module, source)
        };
        self.deliver_errors(outcome)
    }

    /// Invokes the method behind `handle` using the receiver and arguments
    /// already placed in the slots. The return value lands in slot 0.
    pub fn call(&mut self, handle: &Handle) -> InterpretOutcome {
        let outcome = {
            let mut hooks = Dispatch::new(self.config, self.state);
            self.vm.call(&mut hooks, handle.raw())
        };
        self.deliver_errors(outcome)
    }

    /// Compiles a call handle for `signature`, e.g. `"add(_,_)"`.
    pub fn make_call_handle(&mut self, signature: &str) -> Handle {
        Handle::new(self.vm.make_call_handle(signature))
    }

    /// Removes the pin. The handle is consumed; further use is a compile
    /// error, not a runtime hazard.
    pub fn release_handle(&mut self, handle: Handle) {
        let raw = handle.into_raw();
        self.vm.release_handle(raw);
    }

    /// Forces a collection pass. Finalizers for unreachable foreign
    /// instances run before this returns.
    pub fn collect_garbage(&mut self) {
        let mut hooks = Dispatch::new(self.config, self.state);
        self.vm.collect_garbage(&mut hooks);
    }

    pub fn version_number(&self) -> i32 {
        self.vm.version_number()
    }

    // Slot protocol.

    pub fn get_slot_count(&self) -> usize {
        self.vm.get_slot_count()
    }

    /// Grows the register file to at least `count` slots; never shrinks it.
    pub fn ensure_slots(&mut self, count: usize) {
        self.vm.ensure_slots(count);
    }

    pub fn get_slot_type(&self, slot: usize) -> SlotType {
        self.check_slot(slot);
        self.vm.get_slot_type(slot)
    }

    pub fn get_slot_bool(&self, slot: usize) -> bool {
        self.check_slot(slot);
        self.vm.get_slot_bool(slot)
    }

    pub fn get_slot_double(&self, slot: usize) -> f64 {
        self.check_slot(slot);
        self.vm.get_slot_double(slot)
    }

    /// The string in `slot` as raw bytes, embedded zeros included.
    pub fn get_slot_bytes(&self, slot: usize) -> &[u8] {
        self.check_slot(slot);
        self.vm.get_slot_bytes(slot)
    }

    pub fn get_slot_string(&self, slot: usize) -> &str {
        self.check_slot(slot);
        self.vm.get_slot_string(slot)
    }

    /// Pins the value in `slot` so it survives collection until released.
    pub fn get_slot_handle(&mut self, slot: usize) -> Handle {
        self.check_slot(slot);
        Handle::new(self.vm.get_slot_handle(slot))
    }

    /// The payload bound to the foreign instance in `slot`, downcast to `T`.
    pub fn get_slot_foreign<T: Any>(&self, slot: usize) -> &T {
        self.check_slot(slot);
        let addr = self.vm.get_slot_foreign(slot);
        self.state
            .foreign
            .get::<T>(addr)
            .expect("foreign payload missing or of unexpected type")
    }

    pub fn get_slot_foreign_mut<T: Any>(&mut self, slot: usize) -> &mut T {
        self.check_slot(slot);
        let addr = self.vm.get_slot_foreign(slot);
        self.state
            .foreign
            .get_mut::<T>(addr)
            .expect("foreign payload missing or of unexpected type")
    }

    pub fn set_slot_bool(&mut self, slot: usize, value: bool) {
        self.check_slot(slot);
        self.vm.set_slot_bool(slot, value);
    }

    pub fn set_slot_double(&mut self, slot: usize, value: f64) {
        self.check_slot(slot);
        self.vm.set_slot_double(slot, value);
    }

    /// Explicit-length transfer: exactly `bytes.len()` bytes are copied, so
    /// embedded zeros survive. Prefer this over `set_slot_string` whenever
    /// the payload may contain zero bytes.
    pub fn set_slot_bytes(&mut self, slot: usize, bytes: &[u8]) {
        self.check_slot(slot);
        self.vm.set_slot_bytes(slot, bytes);
    }

    pub fn set_slot_string(&mut self, slot: usize, text: &str) {
        self.check_slot(slot);
        self.vm.set_slot_string(slot, text);
    }

    pub fn set_slot_null(&mut self, slot: usize) {
        self.check_slot(slot);
        self.vm.set_slot_null(slot);
    }

    /// Stores the pinned value back into a slot without releasing the pin.
    pub fn set_slot_handle(&mut self, slot: usize, handle: &Handle) {
        self.check_slot(slot);
        self.vm.set_slot_handle(slot, handle.raw());
    }

    pub fn set_slot_new_list(&mut self, slot: usize) {
        self.check_slot(slot);
        self.vm.set_slot_new_list(slot);
    }

    pub fn set_slot_new_map(&mut self, slot: usize) {
        self.check_slot(slot);
        self.vm.set_slot_new_map(slot);
    }

    /// Creates an instance of the foreign class in `class_slot`, stores it in
    /// `slot`, and registers `payload` under the instance's address.
    ///
    /// Inside an allocate callback this must be called exactly once; that is
    /// where the class's finalizer gets attached to the entry. Outside an
    /// allocate callback the instance gets no finalizer of its own.
    pub fn set_slot_new_foreign(
        &mut self,
        slot: usize,
        class_slot: usize,
        payload: Box<dyn Any>,
    ) -> ForeignAddr {
        self.check_slot(slot);
        self.check_slot(class_slot);
        let addr = self.vm.set_slot_new_foreign(slot, class_slot);
        // Only the innermost allocate frame is ours; outer frames belong to
        // callbacks suspended behind this one.
        let finalize = match self.state.allocating.last_mut() {
            Some(frame) => {
                assert!(
                    !frame.installed,
                    "allocate callback must call set_slot_new_foreign exactly once"
                );
                frame.installed = true;
                let class = frame.class;
                self.state.classes[class.0 as usize].finalize.clone()
            }
            None => None,
        };
        self.state.foreign.insert(addr, payload, finalize);
        addr
    }

    // Lists. Elements always travel through a caller-designated slot; the
    // VM's value representation is not host-addressable.

    pub fn get_list_count(&self, slot: usize) -> usize {
        self.check_slot(slot);
        self.vm.get_list_count(slot)
    }

    pub fn get_list_element(&mut self, list_slot: usize, index: i64, element_slot: usize) {
        self.check_slot(list_slot);
        self.check_slot(element_slot);
        self.vm.get_list_element(list_slot, index, element_slot);
    }

    pub fn set_list_element(&mut self, list_slot: usize, index: i64, element_slot: usize) {
        self.check_slot(list_slot);
        self.check_slot(element_slot);
        self.vm.set_list_element(list_slot, index, element_slot);
    }

    /// Inserts the value from `element_slot` at `index`. Negative indices
    /// address from the end; `-1` appends.
    pub fn insert_in_list(&mut self, list_slot: usize, index: i64, element_slot: usize) {
        self.check_slot(list_slot);
        self.check_slot(element_slot);
        self.vm.insert_in_list(list_slot, index, element_slot);
    }

    // Maps.

    pub fn get_map_count(&self, slot: usize) -> usize {
        self.check_slot(slot);
        self.vm.get_map_count(slot)
    }

    pub fn get_map_contains_key(&self, map_slot: usize, key_slot: usize) -> bool {
        self.check_slot(map_slot);
        self.check_slot(key_slot);
        self.vm.get_map_contains_key(map_slot, key_slot)
    }

    pub fn get_map_value(&mut self, map_slot: usize, key_slot: usize, value_slot: usize) {
        self.check_slot(map_slot);
        self.check_slot(key_slot);
        self.check_slot(value_slot);
        self.vm.get_map_value(map_slot, key_slot, value_slot);
    }

    pub fn set_map_value(&mut self, map_slot: usize, key_slot: usize, value_slot: usize) {
        self.check_slot(map_slot);
        self.check_slot(key_slot);
        self.check_slot(value_slot);
        self.vm.set_map_value(map_slot, key_slot, value_slot);
    }

    /// Removes the entry for the key in `key_slot`, leaving the removed value
    /// — or null when the key was absent — in `removed_value_slot`.
    pub fn remove_map_value(&mut self, map_slot: usize, key_slot: usize, removed_value_slot: usize) {
        self.check_slot(map_slot);
        self.check_slot(key_slot);
        self.check_slot(removed_value_slot);
        self.vm.remove_map_value(map_slot, key_slot, removed_value_slot);
    }

    // Top-level variables.

    /// Looks up `name` in (already imported) `module` and stores it in
    /// `slot`. Check `has_module`/`has_variable` first when uncertain.
    pub fn get_variable(&mut self, module: &str, name: &str, slot: usize) {
        self.check_slot(slot);
        self.vm.get_variable(module, name, slot);
    }

    pub fn has_variable(&self, module: &str, name: &str) -> bool {
        self.vm.has_variable(module, name)
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.vm.has_module(module)
    }

    /// Aborts the current fiber with the value in `slot` as the error.
    pub fn abort_fiber(&mut self, slot: usize) {
        self.check_slot(slot);
        self.vm.abort_fiber(slot);
    }

    // Module resolution bridge.

    /// Finishes an import that went through the pending path: interprets the
    /// real source (or raises the failure reason) in the module's context and
    /// transfers control back to the parked importing fiber.
    pub fn complete_import(
        &mut self,
        name: &str,
        result: Result<String, String>,
    ) -> InterpretOutcome {
        assert_eq!(
            self.state.imports.state(name),
            Some(ImportState::Loading),
            "module '{name}' has no import in flight"
        );
        match result {
            Ok(source) => {
                self.state.imports.settle_state(name, ImportState::Resumed);
                let fragment = bridge::resume_fragment(&source);
                self.interpret(name, &fragment)
            }
            Err(reason) => {
                self.state.imports.settle_state(name, ImportState::Failed);
                let fragment = bridge::failure_fragment(&reason);
                self.interpret(name, &fragment)
            }
        }
    }

    /// Flushes the aggregated runtime-error report for a finished run.
    fn deliver_errors(&mut self, outcome: InterpretOutcome) -> InterpretOutcome {
        if outcome == InterpretOutcome::RuntimeError {
            let report = self.state.errors.take().unwrap_or_else(|| ErrorReport::Runtime {
                message: "unknown runtime error".to_string(),
                trace: Vec::new(),
            });
            (self.config.error)(&report);
        }
        outcome
    }
}
