//! Error types for the compilation pipeline
//!
//! All failures funnel into a single [`CompileError`] enum:
//! 1. Registration failures (missing name, invalid level) are raised
//!    synchronously from `Compiler::register` and never deferred.
//! 2. Stage failures (hooks, lexing, rendering, enrichment) are caught once
//!    per call and routed through the error policy gate exactly once.
//!
//! Before a stage failure reaches the caller it is wrapped in
//! [`CompileError::Reported`], which annotates the message with a fixed
//! bug-report suffix while keeping the original error available via
//! `source()`.

use std::fmt;

/// Suffix appended to every error message surfaced by the policy gate.
pub const BUG_REPORT_SUFFIX: &str = "\nPlease report this to https://github.com/marq-rs/marq.";

/// Errors raised during extension registration or pipeline execution
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// A named extension was registered without a name
    ExtensionNameRequired,
    /// A tokenizer extension declared a level other than block or inline
    InvalidExtensionLevel(String),
    /// The parser met a token kind with no renderer willing to handle it
    UnknownToken(String),
    /// A preprocess/postprocess/process-tokens hook failed
    Hook(String),
    /// An enrichment request failed or its completion handle was dropped
    Enrich(String),
    /// A synchronous entry point was called while the async flag was set
    AsyncRequired,
    /// A stage failure annotated with the bug-report suffix by the gate
    Reported(Box<CompileError>),
}

impl CompileError {
    /// Wrap a stage error for surfacing, annotating its message.
    ///
    /// Idempotent: an already-reported error is not wrapped again, so a
    /// failure caught once is never double-annotated.
    pub fn reported(self) -> CompileError {
        match self {
            CompileError::Reported(_) => self,
            other => CompileError::Reported(Box::new(other)),
        }
    }

    /// The error as seen before gate annotation
    pub fn inner(&self) -> &CompileError {
        match self {
            CompileError::Reported(inner) => inner,
            other => other,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::ExtensionNameRequired => write!(f, "extension name required"),
            CompileError::InvalidExtensionLevel(level) => {
                write!(f, "extension level must be 'block' or 'inline', got '{}'", level)
            }
            CompileError::UnknownToken(kind) => {
                write!(f, "token with '{}' kind was not found", kind)
            }
            CompileError::Hook(msg) => write!(f, "hook failed: {}", msg),
            CompileError::Enrich(msg) => write!(f, "enrichment failed: {}", msg),
            CompileError::AsyncRequired => write!(
                f,
                "the async option is set; use compile_async or compile_with_callback"
            ),
            CompileError::Reported(inner) => write!(f, "{}{}", inner, BUG_REPORT_SUFFIX),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Reported(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}
