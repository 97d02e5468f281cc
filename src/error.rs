use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

/// The enclosing project model invalidated the definition tree mid-pass
/// (a re-parse superseded the AST being walked). Checking and lowering
/// abandon the current module and let the driver reschedule it.
///
/// This is deliberately a dedicated error type rather than a variant of
/// [`Error`]: it is the one control-flow shortcut in the core, and callers
/// must handle it explicitly instead of funneling it into generic error
/// reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReparseAborted;

impl fmt::Display for ReparseAborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("compilation pass aborted by concurrent re-parse")
    }
}

impl StdError for ReparseAborted {}

/// Unified error type for the template core's driver surface.
#[derive(Debug)]
pub enum Error {
    Reparse(ReparseAborted),
    Internal {
        message: String,
        backtrace: Option<Backtrace>,
    },
}

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Construct a new internal compiler error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            backtrace: capture_backtrace(),
        }
    }

    /// Return the captured backtrace, if any.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            Error::Internal { backtrace, .. } => backtrace.as_ref(),
            Error::Reparse(_) => None,
        }
    }
}

fn capture_backtrace() -> Option<Backtrace> {
    if cfg!(debug_assertions) {
        Some(Backtrace::force_capture())
    } else {
        None
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Reparse(err) => write!(f, "{err}"),
            Error::Internal { message, .. } => write!(f, "internal error: {message}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Reparse(err) => Some(err),
            Error::Internal { .. } => None,
        }
    }
}

impl From<ReparseAborted> for Error {
    fn from(err: ReparseAborted) -> Self {
        Error::Reparse(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reparse_aborted_converts_into_unified_error() {
        let err: Error = ReparseAborted.into();
        assert!(matches!(err, Error::Reparse(_)));
        assert_eq!(
            err.to_string(),
            "compilation pass aborted by concurrent re-parse"
        );
    }

    #[test]
    fn internal_errors_render_with_prefix() {
        let err = Error::internal("governor assigned twice");
        assert_eq!(err.to_string(), "internal error: governor assigned twice");
    }
}
