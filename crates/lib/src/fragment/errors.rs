//! Error types for fragment operations.

use thiserror::Error;

use super::FragmentId;

/// Errors raised by a [`Fragment`](super::Fragment) or its type implementation.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FragmentError {
    /// The fragment was unloaded; its node link has been severed.
    #[error("Fragment {fragment} has been unloaded")]
    Unloaded { fragment: FragmentId },

    /// The operation needs the fragment's node to be attached to the document.
    #[error("Fragment {fragment} is not attached to the document")]
    Detached { fragment: FragmentId },

    /// A type implementation failed to interpret the raw text.
    #[error("Failed to interpret '{type_id}' content: {reason}")]
    Interpretation { type_id: String, reason: String },
}

impl FragmentError {
    /// Check if this error was caused by using a fragment after unload.
    pub fn is_unloaded(&self) -> bool {
        matches!(self, FragmentError::Unloaded { .. })
    }

    /// Check if this error came from a type implementation.
    pub fn is_interpretation_error(&self) -> bool {
        matches!(self, FragmentError::Interpretation { .. })
    }
}

impl From<FragmentError> for crate::Error {
    fn from(err: FragmentError) -> Self {
        crate::Error::Fragment(err)
    }
}
