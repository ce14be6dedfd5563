//! Host-side embedding layer for the Wren virtual machine.
//!
//! The VM (compiler, interpreter, collector) is an external component behind
//! a narrow, synchronous, C-style ABI; this crate supplies everything a host
//! needs on its side of that boundary:
//! - the slot protocol for typed value marshalling (`session`),
//! - handle pinning for host-held long-lived references (`session::Handle`),
//! - the foreign-object registry bridging host payloads to VM instances
//!   (`foreign`),
//! - callback dispatch for the six VM-initiated callback kinds (`dispatch`),
//! - a bridge that makes an asynchronous module loader usable from the VM's
//!   synchronous load callback, using the VM's own fibers as the suspension
//!   mechanism (`bridge`).
//!
//! The ABI seam itself is the [`abi::VmAbi`] trait; any conforming VM build
//! can sit behind a [`Session`]. Sessions are single-threaded and
//! cooperative: one logical call stack at a time, with re-entrant callbacks
//! supported throughout, and `interpret` returning promptly even while an
//! import is parked on a pending load.

pub mod abi;
pub mod bridge;
pub mod config;
pub mod error;
pub mod foreign;
pub mod session;

mod dispatch;



pub use abi::{ABI_VERSION, ForeignAddr, InterpretOutcome, RawHandle, SlotType, VmAbi};
pub use bridge::ImportState;
pub use config::{Config, ForeignClassMethods, ForeignMethod, ModuleSource};
pub use error::{ErrorReport, TraceFrame};
pub use session::{Caller, Handle, Session};
