use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use serde_json::Value;
use tessera::{FragmentState, RequireOptions, RequireReason};

use crate::helpers::*;

#[tokio::test]
async fn removing_the_node_unloads_the_fragment_once() {
    let ctx = TestContext::new(&[("text/plain", "a")]).with_kind(RecordingKind::new("text/plain"));
    let fragment = ctx.start().await.remove(0);
    let unloads = Arc::new(AtomicUsize::new(0));
    let sink = unloads.clone();
    fragment.register_on_unloaded(move |f| {
        // Handlers still see a live fragment.
        assert!(f.raw().is_ok());
        sink.fetch_add(1, Ordering::SeqCst);
    });

    let section = ctx.document().parent(fragment.node()).unwrap();
    ctx.document().remove(section).unwrap();
    ctx.settle().await;
    fragment.unload();

    assert_eq!(unloads.load(Ordering::SeqCst), 1);
    assert_eq!(fragment.state(), FragmentState::Unloaded);
    assert!(ctx.registry().fragment(fragment.node()).is_none());
    assert!(ctx.registry().fragments().is_empty());
}

#[tokio::test]
async fn moved_nodes_keep_their_wrapper() {
    let ctx = TestContext::new(&[("text/plain", "a"), ("text/plain", "b")])
        .with_kind(RecordingKind::new("text/plain"));
    let fragments = ctx.start().await;
    let doc = ctx.document();

    // Move the first section to the end within one batch.
    let section = doc.parent(fragments[0].node()).unwrap();
    doc.remove(section).unwrap();
    doc.append_child(doc.root(), section).unwrap();
    ctx.settle().await;

    assert!(!fragments[0].is_unloaded());
    assert_eq!(ctx.registry().fragment(fragments[0].node()), Some(fragments[0].clone()));
}

#[tokio::test]
async fn unloaded_fragments_reject_use() {
    let ctx = TestContext::new(&[("text/plain", "a")]).with_kind(RecordingKind::new("text/plain"));
    let fragment = ctx.start().await.remove(0);
    let subscription = fragment.register_on_changed(|_, _| {});
    fragment.unload();

    assert!(fragment.raw().unwrap_err().is_unloaded());
    assert!(fragment.set_raw("b").unwrap_err().is_unloaded());
    assert!(fragment.require(RequireOptions::default()).await.is_err());
    // The node itself is untouched.
    assert_eq!(ctx.document().text_content(fragment.node()), "a");

    subscription.delete();
    subscription.delete();
    assert!(subscription.is_deleted());
}

#[tokio::test]
async fn later_edits_reach_no_unloaded_handler() {
    let ctx = TestContext::new(&[("text/plain", "a")]).with_kind(RecordingKind::new("text/plain"));
    let fragment = ctx.start().await.remove(0);
    let changes = record_changes(&fragment);
    fragment.unload();

    let text = ctx.document().children(fragment.node())[0];
    ctx.document().set_text(text, "edited").unwrap();
    ctx.settle().await;

    assert!(changes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn manual_require_goes_through_the_kind() {
    let kind = RecordingKind::new("text/plain");
    let ctx = TestContext::new(&[("text/plain", "payload")]).with_kind(kind.clone());
    let fragment = ctx.start().await.remove(0);

    let value = fragment
        .require(RequireOptions::default().with_param("strict", true))
        .await
        .unwrap();

    assert_eq!(value, Value::String("payload".to_string()));
    assert_eq!(kind.requires(), vec![RequireReason::Manual]);
}
