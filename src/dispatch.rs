//! Routes VM-initiated callbacks to the session's configured handlers.
//!
//! `Dispatch` is the crate's [`HostHooks`] implementation. It is constructed
//! on the stack for the duration of each re-entrant ABI call (`interpret`,
//! `call`, `collect_garbage`), borrowing the session's state and config, so
//! callback routing always reaches the session that owns the VM instance —
//! there is no global VM-to-session table.
//!
//! Besides plain routing it owns two pieces of protocol adaptation:
//! - output chunks are re-cut into lines (the VM's write granularity is
//!   per-chunk, not per-line);
//! - runtime-error events are aggregated into one report per failure.

use crate::abi::{AbiErrorKind, ClassKey, ForeignAddr, ForeignClassHooks, HostHooks, MethodKey, VmAbi};
use crate::bridge;
use crate::config::{Config, ModuleSource};
use crate::error::{ErrorReport, TraceFrame};
use crate::session::{AllocFrame, Caller, SessionState};

pub(crate) struct Dispatch<'a> {
    pub config: &'a Config,
    pub state: &'a mut SessionState,
}

impl<'a> Dispatch<'a> {
    pub fn new(config: &'a Config, state: &'a mut SessionState) -> Self {
        Dispatch { config, state }
    }
}

impl HostHooks for Dispatch<'_> {
    fn resolve_module(&mut self, importer: &str, name: &str) -> Option<String> {
        (self.config.resolve_module)(importer, name)
    }

    fn load_module(&mut self, name: &str) -> Option<String> {
        match (self.config.load_module)(name) {
            ModuleSource::Source(source) => Some(source),
            ModuleSource::NotFound => None,
            ModuleSource::Pending(future) => {
                // The real source is not here yet. Park the importing fiber
                // behind a generated stub; complete_import finishes the job
                // once the future settles.
                self.state.imports.begin(name, future);
                Some(bridge::suspension_stub())
            }
        }
    }

    fn bind_foreign_method(
        &mut self,
        module: &str,
        class_name: &str,
        is_static: bool,
        signature: &str,
    ) -> Option<MethodKey> {
        let method = (self.config.bind_foreign_method)(module, class_name, is_static, signature)?;
        let key = MethodKey(self.state.methods.len() as u32);
        self.state.methods.push(method);
        tracing::debug!(module, class_name, signature, ?key, "bound foreign method");
        Some(key)
    }

    fn bind_foreign_class(&mut self, module: &str, class_name: &str) -> Option<ForeignClassHooks> {
        let methods = (self.config.bind_foreign_class)(module, class_name)?;
        let key = ClassKey(self.state.classes.len() as u32);
        self.state.classes.push(methods);
        tracing::debug!(module, class_name, ?key, "bound foreign class");
        // The registry entry must be dropped on collection even when the
        // embedder supplied no finalizer of its own.
        Some(ForeignClassHooks {
            allocate: key,
            has_finalizer: true,
        })
    }

    fn invoke_foreign(&mut self, vm: &mut dyn VmAbi, method: MethodKey) {
        let function = self.state.methods[method.0 as usize].clone();
        let mut caller = Caller::new(vm, self.state, self.config);
        function(&mut caller);
    }

    fn foreign_allocate(&mut self, vm: &mut dyn VmAbi, class: ClassKey) {
        let allocate = self.state.classes[class.0 as usize].allocate.clone();
        self.state.allocating.push(AllocFrame {
            class,
            installed: false,
        });
        {
            let mut caller = Caller::new(vm, self.state, self.config);
            allocate(&mut caller);
        }
        // Pop this frame specifically; nested allocations pushed and popped
        // their own frames during the callback.
        let frame = self
            .state
            .allocating
            .pop()
            .expect("allocate frame missing");
        assert!(
            frame.installed,
            "allocate callback must call set_slot_new_foreign exactly once"
        );
    }

    fn foreign_finalize(&mut self, addr: ForeignAddr) {
        match self.state.foreign.remove(addr) {
            Some(entry) => {
                if let Some(finalize) = entry.finalize {
                    finalize(entry.payload);
                }
            }
            None => tracing::debug!(?addr, "finalize for unregistered foreign instance"),
        }
    }

    fn write(&mut self, text: &str) {
        self.state.out.push(text, &*self.config.write);
    }

    fn error(&mut self, kind: AbiErrorKind, module: &str, line: i32, message: &str) {
        match kind {
            AbiErrorKind::Compile => (self.config.error)(&ErrorReport::Compile {
                module: module.to_string(),
                line,
                message: message.to_string(),
            }),
            AbiErrorKind::Runtime => self.state.errors.begin(message),
            AbiErrorKind::StackTrace => self.state.errors.frame(module, line, message),
        }
    }
}

/// Re-cuts arbitrary output chunks into line events.
///
/// One `write` event is flushed per line terminator; an unterminated
/// remainder carries over to the next chunk (and is flushed as a final line
/// when the session is disposed).
#[derive(Default)]
pub(crate) struct OutputBuffer {
    pending: String,
}

impl OutputBuffer {
    pub fn push(&mut self, chunk: &str, sink: &dyn Fn(&str)) {
        self.pending.push_str(chunk);
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending[..pos].to_string();
            self.pending.replace_range(..=pos, "");
            sink(&line);
        }
    }

    /// Flushes a trailing unterminated fragment, if any.
    pub fn flush(&mut self, sink: &dyn Fn(&str)) {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            sink(&line);
        }
    }
}

/// Aggregates the VM's runtime-error event sequence (one message, then
/// ordered trace frames) into a single report.
#[derive(Default)]
pub(crate) struct ErrorCollector {
    current: Option<(String, Vec<TraceFrame>)>,
}

impl ErrorCollector {
    pub fn begin(&mut self, message: &str) {
        debug_assert!(
            self.current.is_none(),
            "runtime error reported while a previous one is still pending"
        );
        self.current = Some((message.to_string(), Vec::new()));
    }

    pub fn frame(&mut self, module: &str, line: i32, function: &str) {
        if let Some((_, trace)) = &mut self.current {
            trace.push(TraceFrame {
                module: module.to_string(),
                line,
                function: function.to_string(),
            });
        }
    }

    pub fn take(&mut self) -> Option<ErrorReport> {
        self.current
            .take()
            .map(|(message, trace)| ErrorReport::Runtime { message, trace })
    }
}
