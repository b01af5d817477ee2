//!
//! Tessera: live-collaborative document fragments.
//! This library turns typed fragment nodes embedded in a shared, continuously
//! edited document tree into live objects with fine-grained change events.
//!
//! ## Core Concepts
//!
//! * **Documents (`dom::Document`)**: The shared tree. Every mutation is recorded and handed to observers in batches at explicit delivery checkpoints.
//! * **Fragments (`fragment::Fragment`)**: A live wrapper around one fragment node. It observes its subtree, diffs text edits into insert/delete events, and keeps an optional derived companion view ("auto-DOM") in sync.
//! * **Fragment kinds (`fragment::FragmentKind`)**: The behaviour of one content type: how raw text is interpreted and what it renders.
//! * **Registry (`registry::FragmentRegistry`)**: Discovers fragment nodes, wraps the ones whose type is registered, remembers the rest for later promotion, and runs load passes one at a time.
//! * **Diffing (`diff`)**: Myers text diff producing the insert/delete scripts behind text events.
//! * **Render cache (`cache::RenderCache`)**: Optional reuse of derived views keyed by type and content hash.

mod auto_dom;
pub mod cache;
pub mod config;
pub mod constants;
mod context;
pub mod diff;
pub mod dom;
pub mod fragment;
mod load;
mod observer;
pub mod registry;

pub use cache::{CacheKey, ContentHash, InMemoryRenderCache, RenderCache};
pub use config::{ConfigError, RuntimeConfig};
pub use context::{FailurePhase, FragmentFailure};
pub use dom::{Document, NodeId, VNode};
pub use fragment::{
    ChangeContext, ContextToken, Fragment, FragmentError, FragmentId, FragmentKind,
    FragmentState, RequireOptions, RequireReason, ScopedWrite, Subscription,
};
pub use registry::{CreateOptions, FragmentRegistry, Query, RegistryError, Selector};

/// Result type used throughout the Tessera library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Tessera library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured document tree errors from the dom module
    #[error(transparent)]
    Dom(dom::DomError),

    /// Structured fragment errors from the fragment module
    #[error(transparent)]
    Fragment(fragment::FragmentError),

    /// Structured registry errors from the registry module
    #[error(transparent)]
    Registry(registry::RegistryError),

    /// Configuration loading errors
    #[error(transparent)]
    Config(config::ConfigError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
            Error::Dom(_) => "dom",
            Error::Fragment(_) => "fragment",
            Error::Registry(_) => "registry",
            Error::Config(_) => "config",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Dom(dom_err) => dom_err.is_not_found(),
            Error::Registry(registry_err) => registry_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error indicates a conflict (already exists).
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Registry(registry_err) => registry_err.is_conflict(),
            _ => false,
        }
    }

    /// Check if this error is validation-related.
    pub fn is_validation_error(&self) -> bool {
        match self {
            Error::Registry(registry_err) => registry_err.is_validation_error(),
            Error::Config(config::ConfigError::Parse(_)) => true,
            _ => false,
        }
    }

    /// Check if this error was caused by using a fragment after unload.
    pub fn is_unloaded(&self) -> bool {
        match self {
            Error::Fragment(fragment_err) => fragment_err.is_unloaded(),
            _ => false,
        }
    }

    /// Check if this error is a structural tree violation.
    pub fn is_hierarchy_error(&self) -> bool {
        match self {
            Error::Dom(dom_err) => dom_err.is_hierarchy_error(),
            _ => false,
        }
    }

    /// Check if this error is type-related.
    pub fn is_type_error(&self) -> bool {
        match self {
            Error::Dom(dom_err) => dom_err.is_type_error(),
            _ => false,
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Config(config::ConfigError::Io { .. })
        )
    }
}
