//! The seam between the host and the embedded Wren VM.
//!
//! The VM is an external component exposed through a narrow, synchronous,
//! C-style ABI. This module models that seam as two traits:
//! - [`VmAbi`]: one method per VM entry point, implemented by whatever backs
//!   the VM (FFI-generated bindings, a wasm build, or the in-crate test VM).
//! - [`HostHooks`]: one method per host capability the VM may call back into
//!   mid-execution (module resolution, loading, foreign binding, text output,
//!   error reporting).
//!
//! Re-entrancy flows through explicit parameters: ABI calls that can call back
//! into the host take a `&mut dyn HostHooks`, and hook methods that may
//! re-enter the VM receive the `&mut dyn VmAbi` back. No global registries.
//!
//! Contract violations (slot index out of range, wrong slot type, using a
//! released handle) are caller bugs, not recoverable errors. Implementations
//! are expected to panic loudly rather than corrupt state; the VM does not
//! bounds-check on the host's behalf.

/// Version of the host-side ABI surface. Bumped on any incompatible change to
/// [`VmAbi`] or [`HostHooks`].
pub const ABI_VERSION: u32 = 1;

/// The low-level representation type of a value in a slot.
///
/// This is not the value's class, just what the ABI can see of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotType {
    Bool = 0,
    Num = 1,
    Foreign = 2,
    List = 3,
    Map = 4,
    Null = 5,
    String = 6,
    /// A type the ABI cannot represent (ranges, fibers, classes, ...).
    Unknown = 7,
}

/// Result of interpreting source or invoking a call handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretOutcome {
    Success,
    CompileError,
    RuntimeError,
}

impl InterpretOutcome {
    pub fn is_success(self) -> bool {
        self == InterpretOutcome::Success
    }
}

/// Kind of an error event reported by the VM.
///
/// A compile error arrives as a single `Compile` event. A runtime error
/// arrives as one `Runtime` event (the message) followed by an ordered series
/// of `StackTrace` events, one per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiErrorKind {
    Compile,
    Runtime,
    StackTrace,
}

/// Unwrapped VM handle: a pinned reference to a VM-resident value.
///
/// The typed, move-only wrapper lives in [`crate::session::Handle`]; raw
/// handles only appear on the ABI seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub u64);

/// VM-assigned address of a foreign-object instance. Stable for the lifetime
/// of the instance and used as the key into the host's foreign registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForeignAddr(pub u64);

/// Index of a host foreign method interned by dispatch. The VM stores this
/// where the C API would store a function pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodKey(pub u32);

/// Index of a host foreign-class binding (allocate + optional finalize).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassKey(pub u32);

/// What the host hands the VM when a foreign class declaration is executed.
#[derive(Debug, Clone, Copy)]
pub struct ForeignClassHooks {
    /// Key the VM passes back to [`HostHooks::foreign_allocate`] when an
    /// instance of the class is constructed.
    pub allocate: ClassKey,
    /// Whether [`HostHooks::foreign_finalize`] must be invoked when an
    /// instance is collected.
    pub has_finalizer: bool,
}

/// Host capabilities the VM re-enters during execution.
///
/// One method per capability; implementations route to the embedder's
/// configured handlers. `foreign_finalize` deliberately receives no VM
/// reference: the collector may be mid-cycle, and finalizers must not touch
/// slots or allocate.
pub trait HostHooks {
    /// Canonicalize an import string. `None` means the import cannot be
    /// resolved; the VM reports that as a runtime error.
    fn resolve_module(&mut self, importer: &str, name: &str) -> Option<String>;

    /// Produce source for a canonical module name. Called at most once per
    /// name (the VM caches the result). `None` means not found.
    fn load_module(&mut self, name: &str) -> Option<String>;

    /// Bind a foreign method declaration to a host function. `None` leaves
    /// the method unbound; calling it is a runtime error.
    fn bind_foreign_method(
        &mut self,
        module: &str,
        class_name: &str,
        is_static: bool,
        signature: &str,
    ) -> Option<MethodKey>;

    /// Bind a foreign class declaration to host allocate/finalize logic.
    fn bind_foreign_class(&mut self, module: &str, class_name: &str) -> Option<ForeignClassHooks>;

    /// Invoke a previously bound foreign method. Slot 0 holds the receiver,
    /// arguments follow; the return value is left in slot 0.
    fn invoke_foreign(&mut self, vm: &mut dyn VmAbi, method: MethodKey);

    /// Run the allocate half of a foreign class binding. The callback must
    /// install exactly one new foreign instance via `set_slot_new_foreign`.
    fn foreign_allocate(&mut self, vm: &mut dyn VmAbi, class: ClassKey);

    /// An instance was collected. The host drops its registry entry. No VM
    /// access is possible from here, by construction.
    fn foreign_finalize(&mut self, addr: ForeignAddr);

    /// Text output from the VM. Chunks are not line-delimited.
    fn write(&mut self, text: &str);

    /// An error event; see [`AbiErrorKind`] for the calling protocol.
    fn error(&mut self, kind: AbiErrorKind, module: &str, line: i32, message: &str);
}

/// One VM instance behind the C-style ABI.
///
/// Method names follow the C API. Slot preconditions are the C API's: the
/// index must be in range and the slot must hold (or be about to hold) a value
/// of the matching type. Violations panic.
pub trait VmAbi {
    /// VM version as an integer, e.g. 4000 for 0.4.0.
    fn version_number(&self) -> i32;

    /// Runs `source` in a new fiber in the context of the resolved module
    /// `module`. Creates the module if it does not exist yet, otherwise
    /// reuses its top-level scope.
    fn interpret(
        &mut self,
        hooks: &mut dyn HostHooks,
        module: &str,
        source: &str,
    ) -> InterpretOutcome;

    /// Calls the method captured in `handle`, using the receiver and
    /// arguments previously set up in the slots.
    fn call(&mut self, hooks: &mut dyn HostHooks, handle: RawHandle) -> InterpretOutcome;

    /// Creates a reusable handle for invoking a method with `signature`.
    fn make_call_handle(&mut self, signature: &str) -> RawHandle;

    /// Releases a pin. The raw handle must not be used afterwards.
    fn release_handle(&mut self, handle: RawHandle);

    /// Forces a collection pass. Unreachable foreign instances are reported
    /// through [`HostHooks::foreign_finalize`].
    fn collect_garbage(&mut self, hooks: &mut dyn HostHooks);

    /// Tears the instance down. Remaining foreign instances are finalized.
    fn dispose(&mut self, hooks: &mut dyn HostHooks);

    // Slots.

    fn get_slot_count(&self) -> usize;

    /// Grows the register file to at least `count` slots. Never shrinks.
    fn ensure_slots(&mut self, count: usize);

    fn get_slot_type(&self, slot: usize) -> SlotType;

    fn get_slot_bool(&self, slot: usize) -> bool;
    fn get_slot_double(&self, slot: usize) -> f64;

    /// The raw bytes of the string in `slot`, embedded zeros included. The
    /// returned borrow is only valid until the next ABI call.
    fn get_slot_bytes(&self, slot: usize) -> &[u8];

    fn get_slot_string(&self, slot: usize) -> &str;

    /// Pins the value in `slot` and returns a handle to it.
    fn get_slot_handle(&mut self, slot: usize) -> RawHandle;

    /// Address of the foreign instance in `slot`.
    fn get_slot_foreign(&self, slot: usize) -> ForeignAddr;

    fn set_slot_bool(&mut self, slot: usize, value: bool);
    fn set_slot_double(&mut self, slot: usize, value: f64);

    /// Explicit-length byte transfer; safe for embedded zeros.
    fn set_slot_bytes(&mut self, slot: usize, bytes: &[u8]);

    /// Text transfer. At the C seam this is the terminator-scanned form; use
    /// `set_slot_bytes` when the payload may contain zero bytes.
    fn set_slot_string(&mut self, slot: usize, text: &str);

    fn set_slot_null(&mut self, slot: usize);

    /// Stores the pinned value without releasing the pin.
    fn set_slot_handle(&mut self, slot: usize, handle: RawHandle);

    fn set_slot_new_list(&mut self, slot: usize);
    fn set_slot_new_map(&mut self, slot: usize);

    /// Creates an instance of the foreign class in `class_slot`, stores it in
    /// `slot`, and returns its address. Does not run any constructor logic.
    fn set_slot_new_foreign(&mut self, slot: usize, class_slot: usize) -> ForeignAddr;

    // Lists. Elements move between slots; the VM's value representation is
    // not host-addressable.

    fn get_list_count(&self, slot: usize) -> usize;
    fn get_list_element(&mut self, list_slot: usize, index: i64, element_slot: usize);
    fn set_list_element(&mut self, list_slot: usize, index: i64, element_slot: usize);

    /// Negative indices address from the end; `-1` appends.
    fn insert_in_list(&mut self, list_slot: usize, index: i64, element_slot: usize);

    // Maps.

    fn get_map_count(&self, slot: usize) -> usize;
    fn get_map_contains_key(&self, map_slot: usize, key_slot: usize) -> bool;
    fn get_map_value(&mut self, map_slot: usize, key_slot: usize, value_slot: usize);
    fn set_map_value(&mut self, map_slot: usize, key_slot: usize, value_slot: usize);

    /// Removes the entry and leaves the removed value (or null when the key
    /// was absent) in `removed_value_slot`.
    fn remove_map_value(&mut self, map_slot: usize, key_slot: usize, removed_value_slot: usize);

    // Top-level variables.

    /// Looks up `name` in the (already imported) module and stores it in
    /// `slot`. Both must exist.
    fn get_variable(&mut self, module: &str, name: &str, slot: usize);

    fn has_variable(&self, module: &str, name: &str) -> bool;
    fn has_module(&self, module: &str) -> bool;

    /// Aborts the current fiber, using the value in `slot` as the error.
    fn abort_fiber(&mut self, slot: usize);
}
