//! Derived-render cache.
//!
//! Auto-DOM content is a pure function of a fragment's type and raw text, so
//! renders can be reused across fragments and sessions. The cache is an
//! optional collaborator: without one every render recomputes.

use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, PoisonError},
};

use crate::dom::VNode;

/// blake3 hash of a fragment's raw text.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(raw: &str) -> Self {
        Self(*blake3::hash(raw.as_bytes()).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Key of a cached render.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub type_id: String,
    pub content_hash: ContentHash,
}

impl CacheKey {
    pub fn new(type_id: impl Into<String>, raw: &str) -> Self {
        Self {
            type_id: type_id.into(),
            content_hash: ContentHash::of(raw),
        }
    }
}

/// Storage for derived renders.
///
/// Implementations must tolerate concurrent access; failures should be
/// reported as a miss rather than surfaced.
pub trait RenderCache: Send + Sync {
    /// Look up a previous render.
    fn get(&self, key: &CacheKey) -> Option<Vec<VNode>>;

    /// Store a render.
    fn set(&self, key: CacheKey, value: Vec<VNode>);
}

/// Unbounded in-process [`RenderCache`].
#[derive(Debug, Default)]
pub struct InMemoryRenderCache {
    entries: Mutex<HashMap<CacheKey, Vec<VNode>>>,
}

impl InMemoryRenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RenderCache for InMemoryRenderCache {
    fn get(&self, key: &CacheKey) -> Option<Vec<VNode>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: CacheKey, value: Vec<VNode>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }
}
