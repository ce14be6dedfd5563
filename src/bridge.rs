//! Makes an asynchronous host module loader usable from the VM's synchronous
//! load callback.
//!
//! The load callback must return source immediately; it cannot await. When
//! the embedder's loader answers [`Pending`](crate::config::ModuleSource::Pending),
//! dispatch hands the VM a generated stub in place of the real module. The
//! stub captures the importing fiber into a module-local binding and suspends
//! it, so `interpret` returns to the host promptly with the import parked.
//!
//! When the loader's future settles, [`complete_import`] runs a second
//! fragment in the same module context:
//! - on success, the real source followed by a transfer back to the captured
//!   fiber;
//! - on failure, a `transferError` carrying the escaped reason, which raises
//!   a runtime error in the importing fiber.
//!
//! Per canonical name the lifecycle is `Loading -> Resumed | Failed`. The VM
//! fires the load callback once per name, so at most one suspension is ever
//! outstanding per name. A future that never settles leaves the fiber parked
//! until VM teardown — a leak, not a crash.
//!
//! [`complete_import`]: crate::session::Session::complete_import

use std::collections::HashMap;

use crate::config::LoadFuture;

/// Module-local binding the stub captures the importing fiber into. The name
/// only needs to dodge collisions within the stubbed module itself, which
/// contains no other code until the real source arrives.
const FIBER_BINDING: &str = "wrenHostImportFiber";

/// Lifecycle of one canonical module name that went through a pending load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    /// The loader future has not settled; the importing fiber is parked.
    Loading,
    /// Real source was interpreted and the importing fiber resumed.
    Resumed,
    /// The load failed; the importing fiber received a runtime error.
    Failed,
}

struct ImportRecord {
    state: ImportState,
    /// Present only while `Loading`.
    future: Option<LoadFuture>,
}

/// Per-session table of imports that went through the pending path.
#[derive(Default)]
pub(crate) struct ImportTable {
    records: HashMap<String, ImportRecord>,
}

impl ImportTable {
    /// Registers a pending load. The VM's per-name load cache guarantees this
    /// fires at most once per canonical name.
    pub fn begin(&mut self, name: &str, future: LoadFuture) {
        let previous = self.records.insert(
            name.to_string(),
            ImportRecord {
                state: ImportState::Loading,
                future: Some(future),
            },
        );
        assert!(
            previous.is_none(),
            "module '{name}' already has an import record"
        );
        tracing::debug!(module = name, "import parked on pending load");
    }

    /// Takes the future for `name`, transitioning is the caller's job.
    pub fn take_future(&mut self, name: &str) -> Option<LoadFuture> {
        self.records.get_mut(name).and_then(|r| r.future.take())
    }

    pub fn state(&self, name: &str) -> Option<ImportState> {
        self.records.get(name).map(|r| r.state)
    }

    pub fn settle_state(&mut self, name: &str, state: ImportState) {
        let record = self
            .records
            .get_mut(name)
            .unwrap_or_else(|| panic!("module '{name}' has no import record"));
        assert_eq!(
            record.state,
            ImportState::Loading,
            "import of '{name}' settled twice"
        );
        record.state = state;
        record.future = None;
        tracing::debug!(module = name, ?state, "import settled");
    }

    /// Canonical names still waiting on their loader future, in no
    /// particular order.
    pub fn loading(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|(_, r)| r.state == ImportState::Loading)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// The script interpreted in place of a module whose source is pending. Parks
/// the importing fiber and hands control back to the host.
pub(crate) fn suspension_stub() -> String {
    format!("var {FIBER_BINDING} = Fiber.current\nFiber.suspend()\n")
}

/// The fragment interpreted in the module's context once real source arrives:
/// the source itself, then a transfer back to the parked importing fiber.
pub(crate) fn resume_fragment(source: &str) -> String {
    format!("{source}\n{FIBER_BINDING}.transfer()\n")
}

/// The fragment interpreted when the load fails: raises `reason` as a runtime
/// error inside the parked importing fiber.
pub(crate) fn failure_fragment(reason: &str) -> String {
    format!(
        "{FIBER_BINDING}.transferError(\"{}\")\n",
        escape_string_literal(reason)
    )
}

/// Escapes host text for embedding in a double-quoted Wren string literal:
/// backslash, double quote, `%` (interpolation), newline, carriage return,
/// tab, and NUL. Other characters are legal inside a literal and pass
/// through unchanged.
pub(crate) fn escape_string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '%' => out.push_str("\\%"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out
}
