//! Error types for registry operations.

use thiserror::Error;

/// Errors raised by the [`FragmentRegistry`](super::FragmentRegistry).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A second implementation was registered for a type id. The first one
    /// stays in place.
    #[error("Fragment type '{type_id}' is already registered")]
    DuplicateType { type_id: String },

    /// No implementation is registered for the type id.
    #[error("Fragment type '{type_id}' is not registered")]
    UnknownType { type_id: String },

    /// A selector string could not be parsed.
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
}

impl RegistryError {
    /// Check if this error indicates an unregistered type.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::UnknownType { .. })
    }

    /// Check if this error indicates a registration conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RegistryError::DuplicateType { .. })
    }

    /// Check if this error came from parsing user input.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, RegistryError::InvalidSelector { .. })
    }
}

impl From<RegistryError> for crate::Error {
    fn from(err: RegistryError) -> Self {
        crate::Error::Registry(err)
    }
}
