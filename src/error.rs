use thiserror::Error;

use crate::diag::Diagnostic;

/// Result type for treec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the treec back end
#[derive(Error, Debug)]
pub enum Error {
    /// The member failed semantic checking. The offending program points
    /// were already reported through the diagnostic sink; the collected
    /// diagnostics ride along for callers that want to render them.
    #[error("semantic checking failed with {} error(s)", .diagnostics.len())]
    Semantic { diagnostics: Vec<Diagnostic> },

    /// An invariant violation detected after checking (during folding or
    /// code generation). This is a bug in the checker, not in the input
    /// program, and aborts compilation of the current member.
    #[error("internal compiler error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create an internal compiler error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}

/// Shorthand for raising an internal compiler error from fold/codegen.
///
/// Inconsistencies at those stages mean the checking pass failed to reject
/// or annotate the tree; they are never user-facing diagnostics.
macro_rules! bug {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::Internal { message: format!($($arg)*) })
    };
}

pub(crate) use bug;
