//! Fragment type implementations.
//!
//! A [`FragmentKind`] supplies the behaviour of one content type: how to
//! interpret the raw text, whether it can run automatically, and what derived
//! view it renders. The runtime owns lifecycle, observation and scheduling;
//! kinds only answer questions about content.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::Fragment;
use crate::{Result, dom::VNode};

/// Why `require()` is being called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RequireReason {
    /// Called directly by user code.
    #[default]
    Manual,
    /// Called by the load pass for a fragment with auto enabled.
    Load,
    /// Called by the default auto-DOM renderer.
    AutoDom,
}

/// Options passed to [`FragmentKind::require`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequireOptions {
    pub reason: RequireReason,
    /// Free-form parameters a kind may interpret.
    pub params: Map<String, Value>,
}

impl RequireOptions {
    pub fn new(reason: RequireReason) -> Self {
        Self {
            reason,
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Behaviour of one fragment content type.
///
/// Every method except [`type_id`](FragmentKind::type_id) has a default, so a
/// minimal kind only names itself.
#[async_trait]
pub trait FragmentKind: Send + Sync {
    /// The MIME-like type id this kind handles, e.g. `text/plain`.
    fn type_id(&self) -> &str;

    /// Called once when a wrapper for this kind has been constructed.
    fn on_constructed(&self, _fragment: &Fragment) {}

    /// Interpret the fragment's raw text.
    async fn require(&self, _fragment: &Fragment, _options: RequireOptions) -> Result<Value> {
        Ok(Value::Null)
    }

    /// Whether the kind does something when `auto` is set.
    fn supports_auto(&self) -> bool {
        false
    }

    /// Whether the kind renders a derived companion view.
    fn supports_auto_dom(&self) -> bool {
        false
    }

    /// Produce the companion content. `None` renders nothing.
    ///
    /// The default interprets the value returned by `require()`.
    async fn create_auto_dom(&self, fragment: &Fragment) -> Result<Option<Vec<VNode>>> {
        let value = self
            .require(fragment, RequireOptions::new(RequireReason::AutoDom))
            .await?;
        Ok(content_from_value(value))
    }

    /// Called once per load pass in which the fragment is first seen.
    async fn on_loaded(&self, _fragment: &Fragment) -> Result<()> {
        Ok(())
    }
}

/// Turn an interpreted value into companion content.
///
/// Strings and scalars become one text node, serialized [`VNode`]s are used
/// as-is, and any other structure is shown as pretty-printed JSON.
pub fn content_from_value(value: Value) -> Option<Vec<VNode>> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(vec![VNode::text(text)]),
        Value::Bool(_) | Value::Number(_) => Some(vec![VNode::text(value.to_string())]),
        structured => {
            if let Ok(nodes) = serde_json::from_value::<Vec<VNode>>(structured.clone()) {
                return Some(nodes);
            }
            if let Ok(node) = serde_json::from_value::<VNode>(structured.clone()) {
                return Some(vec![node]);
            }
            let pretty =
                serde_json::to_string_pretty(&structured).unwrap_or_else(|_| structured.to_string());
            Some(vec![VNode::text(pretty)])
        }
    }
}
