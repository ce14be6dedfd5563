//! Structured error reports surfaced through the configured error handler.
//!
//! The VM reports a runtime error as one message event followed by ordered
//! stack-trace events. Dispatch aggregates those into a single
//! [`ErrorReport`] per failing `interpret`/`call`, so the embedder sees one
//! value per failure regardless of whether the failure was detected by the
//! VM or by the host (a resolver or loader returning nothing).

use std::fmt;

/// One stack-trace entry of a runtime error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    /// Resolved module the frame's function is defined in.
    pub module: String,
    /// Line the function is defined on.
    pub line: i32,
    /// Name of the method or function, e.g. `(script)` for top-level code.
    pub function: String,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{} line {}] in {}", self.module, self.line, self.function)
    }
}

/// One failure, aggregated to the granularity of an `interpret`/`call`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorReport {
    /// A syntax or resolution error detected at compile time.
    Compile {
        module: String,
        line: i32,
        message: String,
    },
    /// A runtime error with its stack trace, innermost frame first.
    Runtime {
        message: String,
        trace: Vec<TraceFrame>,
    },
}

impl ErrorReport {
    /// The bare error message, without location formatting.
    pub fn message(&self) -> &str {
        match self {
            ErrorReport::Compile { message, .. } => message,
            ErrorReport::Runtime { message, .. } => message,
        }
    }

    pub fn is_compile(&self) -> bool {
        matches!(self, ErrorReport::Compile { .. })
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorReport::Compile {
                module,
                line,
                message,
            } => {
                write!(f, "[{module} line {line}] [Error] {message}")
            }
            ErrorReport::Runtime { message, trace } => {
                write!(f, "[Runtime Error] {message}")?;
                for frame in trace {
                    write!(f, "\n  {frame}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ErrorReport {}
