//! Render command - runs the fragments of a document and prints the result.
//!
//! Edits are applied one at a time and the document is settled after each,
//! so every step's events and renders are visible in the log.

use std::{path::Path, sync::Arc};

use serde::Deserialize;
use tessera::{
    Document, Fragment, FragmentFailure, FragmentRegistry, Query, RuntimeConfig, VNode,
};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{error, info, warn};

use crate::{
    cli::RenderArgs,
    kinds::{JsonKind, PlainTextKind},
};

/// One scripted edit, addressed by selector.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Edit {
    SetRaw { selector: String, value: String },
    SetAuto { selector: String, enabled: bool },
    Remove { selector: String },
}

impl Edit {
    fn selector(&self) -> &str {
        match self {
            Edit::SetRaw { selector, .. }
            | Edit::SetAuto { selector, .. }
            | Edit::Remove { selector } => selector,
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&json)?)
}

/// Log every event a fragment emits.
fn trace_events(fragment: &Fragment) {
    fragment.register_on_changed(|f, context| {
        info!(fragment = %f.id(), ?context, "changed");
    });
    fragment.register_on_text_inserted(|f, offset, value| {
        info!(fragment = %f.id(), offset, value, "text inserted");
    });
    fragment.register_on_text_deleted(|f, offset, value| {
        info!(fragment = %f.id(), offset, value, "text deleted");
    });
    fragment.register_on_auto_changed(|f, enabled| {
        info!(fragment = %f.id(), enabled, "auto changed");
    });
    fragment.register_on_class_changed(|f, class| {
        info!(fragment = %f.id(), class, "class changed");
    });
    fragment.register_on_unloaded(|f| {
        info!(fragment = %f.id(), "unloaded");
    });
}

fn drain_failures(failures: &mut broadcast::Receiver<FragmentFailure>) {
    loop {
        match failures.try_recv() {
            Ok(failure) => error!(
                fragment = %failure.fragment,
                type_id = %failure.type_id,
                phase = ?failure.phase,
                "{}",
                failure.message
            ),
            Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "Dropped fragment failures"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

fn apply(registry: &FragmentRegistry, edit: &Edit) -> Result<(), Box<dyn std::error::Error>> {
    let query = Query::try_from(edit.selector())?;
    let targets = registry.find_all(query)?;
    if targets.is_empty() {
        warn!(selector = edit.selector(), "Edit matched no fragment");
    }
    for fragment in targets {
        match edit {
            Edit::SetRaw { value, .. } => fragment.set_raw(value)?,
            Edit::SetAuto { enabled, .. } => fragment.set_auto(*enabled)?,
            Edit::Remove { .. } => registry.document().remove(fragment.node())?,
        }
    }
    Ok(())
}

/// Run the render command
pub async fn run(args: &RenderArgs, config: RuntimeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let body: VNode = read_json(&args.document)?;
    let edits: Vec<Edit> = match &args.edits {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    let document = Document::from_vnode(&body)?;
    let registry = FragmentRegistry::new(document, config);
    registry.register_type(Arc::new(PlainTextKind))?;
    registry.register_type(Arc::new(JsonKind))?;
    let mut failures = registry.subscribe_failures();

    let fragments = registry.discover_all()?;
    info!(fragments = fragments.len(), "Discovered fragments");
    for fragment in &fragments {
        trace_events(fragment);
    }
    registry.mark_types_installed();
    registry.settle().await;
    drain_failures(&mut failures);

    for (step, edit) in edits.iter().enumerate() {
        info!(step, ?edit, "Applying edit");
        apply(&registry, edit)?;
        registry.settle().await;
        drain_failures(&mut failures);
    }

    let snapshot = registry.document().snapshot(registry.document().root())?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
