//! Session configuration: the six host callbacks and their defaults.
//!
//! Handlers are plain `Fn` closures so they stay callable during re-entrant
//! VM activity; handlers that need mutable host state capture it behind
//! `Rc<RefCell<...>>` (or similar) on the embedder's side.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::error::ErrorReport;
use crate::session::Caller;

/// A host function bound to a foreign method. Slot 0 holds the receiver,
/// arguments follow; leave the return value in slot 0.
pub type ForeignMethod = Rc<dyn Fn(&mut Caller<'_>)>;

/// Finalizer for a foreign payload. Runs while the collector may be
/// mid-cycle, so it receives the payload only — no VM access.
pub type FinalizeFn = Rc<dyn Fn(Box<dyn Any>)>;

/// An in-flight module load. Resolves to source text or a failure reason
/// (which reaches the importing fiber as a runtime error, verbatim).
pub type LoadFuture = Pin<Box<dyn Future<Output = Result<String, String>>>>;

/// Result of the load-module callback.
pub enum ModuleSource {
    /// The module's source text, available now.
    Source(String),
    /// No such module; the VM reports a runtime error at the import site.
    NotFound,
    /// The source is not available yet. The importing fiber is suspended and
    /// resumed when the future settles; see [`crate::bridge`].
    Pending(LoadFuture),
}

impl fmt::Debug for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModuleSource::Source(src) => f.debug_tuple("Source").field(&src.len()).finish(),
            ModuleSource::NotFound => f.write_str("NotFound"),
            ModuleSource::Pending(_) => f.write_str("Pending"),
        }
    }
}

impl From<String> for ModuleSource {
    fn from(source: String) -> Self {
        ModuleSource::Source(source)
    }
}

impl From<&str> for ModuleSource {
    fn from(source: &str) -> Self {
        ModuleSource::Source(source.to_string())
    }
}

/// Allocate/finalize pair for a foreign class.
pub struct ForeignClassMethods {
    /// Runs during construction, before any user-level constructor logic.
    /// Must call `set_slot_new_foreign` exactly once.
    pub allocate: ForeignMethod,
    /// Runs when an instance is collected; receives the payload back.
    pub finalize: Option<FinalizeFn>,
}

/// The callback surface a [`crate::session::Session`] is constructed with.
///
/// Every field has a working default, so embedders override only what they
/// use.
pub struct Config {
    /// Canonicalizes an import string, given the importing module and the
    /// string as written. `None` marks the import unresolvable.
    ///
    /// Default: returns `name` unchanged.
    pub resolve_module: Box<dyn Fn(&str, &str) -> Option<String>>,

    /// Produces source for a canonical module name. Called at most once per
    /// name; the VM caches the result.
    ///
    /// Default: [`ModuleSource::NotFound`] for every name.
    pub load_module: Box<dyn Fn(&str) -> ModuleSource>,

    /// Binds a `foreign` method declaration to a host function, keyed by
    /// module, class, staticness, and signature.
    ///
    /// Default: `None` (calling the method is a runtime error).
    pub bind_foreign_method: Box<dyn Fn(&str, &str, bool, &str) -> Option<ForeignMethod>>,

    /// Binds a `foreign class` declaration to allocate/finalize logic.
    ///
    /// Default: `None` (constructing the class is a runtime error).
    pub bind_foreign_class: Box<dyn Fn(&str, &str) -> Option<ForeignClassMethods>>,

    /// Receives one complete output line per call, terminator stripped.
    /// `System.print` granularity is reconstructed by dispatch regardless of
    /// how the VM chunks its output.
    ///
    /// Default: prints the line to stdout.
    pub write: Box<dyn Fn(&str)>,

    /// Receives one aggregated report per failure.
    ///
    /// Default: prints the report to stderr.
    pub error: Box<dyn Fn(&ErrorReport)>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            resolve_module: Box::new(|_importer, name| Some(name.to_string())),
            load_module: Box::new(|_name| ModuleSource::NotFound),
            bind_foreign_method: Box::new(|_, _, _, _| None),
            bind_foreign_class: Box::new(|_, _| None),
            write: Box::new(|line| println!("{line}")),
            error: Box::new(|report| eprintln!("{report}")),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Config { .. }")
    }
}
