//! Demonstration fragment kinds bundled with the binary.

use serde_json::Value;
use tessera::{Fragment, FragmentError, FragmentKind, RequireOptions, Result, VNode};

/// `text/plain`: the raw text, shown verbatim.
pub struct PlainTextKind;

#[async_trait::async_trait]
impl FragmentKind for PlainTextKind {
    fn type_id(&self) -> &str {
        "text/plain"
    }

    async fn require(&self, fragment: &Fragment, _options: RequireOptions) -> Result<Value> {
        Ok(Value::String(fragment.raw()?))
    }

    fn supports_auto(&self) -> bool {
        true
    }

    fn supports_auto_dom(&self) -> bool {
        true
    }

    async fn create_auto_dom(&self, fragment: &Fragment) -> Result<Option<Vec<VNode>>> {
        Ok(Some(vec![VNode::element("pre").with_text(fragment.raw()?)]))
    }
}

/// `application/json`: parsed on require, pretty-printed as its view.
pub struct JsonKind;

#[async_trait::async_trait]
impl FragmentKind for JsonKind {
    fn type_id(&self) -> &str {
        "application/json"
    }

    async fn require(&self, fragment: &Fragment, _options: RequireOptions) -> Result<Value> {
        let raw = fragment.raw()?;
        serde_json::from_str(&raw).map_err(|e| {
            FragmentError::Interpretation {
                type_id: self.type_id().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn supports_auto(&self) -> bool {
        true
    }

    fn supports_auto_dom(&self) -> bool {
        true
    }

    async fn create_auto_dom(&self, fragment: &Fragment) -> Result<Option<Vec<VNode>>> {
        let value = self.require(fragment, RequireOptions::default()).await?;
        let pretty = serde_json::to_string_pretty(&value)?;
        Ok(Some(vec![
            VNode::element("pre")
                .with_attribute("class", "json")
                .with_text(pretty),
        ]))
    }
}
