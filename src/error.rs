//! The non-diagnostic failure type.
//!
//! Source problems (a missing semicolon, an undeclared identifier) are
//! [`crate::diagnostics::Diagnostic`]s, not [`Err`] — a pipeline stage
//! reports them and keeps going. [`CompileError`] is reserved for the other
//! kind of failure: an internal invariant broken by this compiler itself
//! (a malformed IR module reaching codegen), or an I/O failure reading the
//! source file or writing the assembly output.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum CompileError {
    /// An IR or codegen invariant was violated — a bug in this compiler,
    /// not in the input program.
    Internal(String),
    Io(io::Error),
    /// A `write!` into an in-memory assembly/IR buffer failed.
    Format(fmt::Error),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Internal(msg) => write!(f, "internal compiler error: {msg}"),
            CompileError::Io(e) => write!(f, "I/O error: {e}"),
            CompileError::Format(e) => write!(f, "assembly generation error: {e}"),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Internal(_) => None,
            CompileError::Io(e) => Some(e),
            CompileError::Format(e) => Some(e),
        }
    }
}

impl From<io::Error> for CompileError {
    fn from(e: io::Error) -> Self {
        CompileError::Io(e)
    }
}

impl From<fmt::Error> for CompileError {
    fn from(e: fmt::Error) -> Self {
        CompileError::Format(e)
    }
}

impl From<String> for CompileError {
    fn from(s: String) -> Self {
        CompileError::Internal(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_error_displays_with_prefix() {
        let e = CompileError::Internal("block 'bb3' has no terminator".to_string());
        assert_eq!(e.to_string(), "internal compiler error: block 'bb3' has no terminator");
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let e: CompileError = io_err.into();
        assert!(e.to_string().contains("I/O error"));
    }
}
