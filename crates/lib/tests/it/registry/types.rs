use tessera::{FragmentKind, VNode};

use crate::helpers::*;

#[tokio::test]
async fn unknown_nodes_are_promoted_in_document_order() {
    let plain = RecordingKind::new("text/plain");
    let ctx = TestContext::new(&[
        ("text/later", "1"),
        ("text/plain", "p"),
        ("text/later", "2"),
        ("text/later", "3"),
    ])
    .with_kind(plain);
    let wrapped = ctx.start().await;
    assert_eq!(wrapped.len(), 1);

    let pending = ctx.registry().unknown_nodes("text/later");
    let texts: Vec<String> = pending
        .iter()
        .map(|n| ctx.document().text_content(*n))
        .collect();
    assert_eq!(texts, vec!["1", "2", "3"]);

    let later = RecordingKind::new("text/later");
    let promoted = ctx.registry().register_type(later.clone()).unwrap();
    ctx.settle().await;

    assert_eq!(promoted.len(), 3);
    assert_eq!(later.loaded(), pending);
    assert!(ctx.registry().unknown_nodes("text/later").is_empty());
    assert!(promoted.iter().all(|f| f.is_loaded()));
}

#[tokio::test]
async fn unregistering_keeps_content_for_reregistration() {
    let first = RecordingKind::new("text/plain");
    let ctx = TestContext::new(&[]).with_kind(first.clone());
    ctx.start().await;
    let fragment = ctx
        .registry()
        .create("text/plain", "hello", Default::default())
        .unwrap();
    ctx.settle().await;
    assert_eq!(first.loaded(), vec![fragment.node()]);

    let removed = ctx.registry().unregister_type("text/plain").unwrap();
    assert_eq!(removed.type_id(), "text/plain");
    assert!(fragment.is_unloaded());
    assert!(!ctx.registry().is_registered("text/plain"));
    assert_eq!(ctx.registry().unknown_nodes("text/plain"), vec![fragment.node()]);
    assert!(ctx.document().is_connected(fragment.node()));

    let second = RecordingKind::new("text/plain");
    let promoted = ctx.registry().register_type(second.clone()).unwrap();
    ctx.settle().await;

    assert_eq!(promoted.len(), 1);
    let revived = &promoted[0];
    assert_ne!(revived, &fragment);
    assert_eq!(revived.node(), fragment.node());
    assert_eq!(revived.raw().unwrap(), "hello");
    assert_eq!(second.loaded(), vec![fragment.node()]);
    assert_eq!(first.loaded().len(), 1);
}

#[tokio::test]
async fn duplicate_registration_keeps_the_first_kind() {
    let first = RecordingKind::new("text/plain");
    let second = RecordingKind::new("text/plain");
    let ctx = TestContext::new(&[("text/plain", "a")]).with_kind(first.clone());

    let err = ctx.registry().register_type(second.clone()).unwrap_err();
    assert!(err.is_conflict());
    ctx.start().await;

    assert_eq!(first.constructed(), 1);
    assert_eq!(second.constructed(), 0);
    assert_eq!(ctx.registry().registered_types(), vec!["text/plain"]);
}

#[tokio::test]
async fn duplicate_registration_leaves_unknown_nodes_alone() {
    let ctx = TestContext::new(&[("text/plain", "a"), ("text/other", "b")])
        .with_kind(RecordingKind::new("text/plain"));
    ctx.start().await;
    let passes = ctx.registry().load_passes();

    let err = ctx
        .registry()
        .register_type(RecordingKind::new("text/plain"))
        .unwrap_err();
    assert!(err.is_conflict());
    ctx.settle().await;

    assert_eq!(ctx.registry().unknown_nodes("text/other").len(), 1);
    assert_eq!(ctx.registry().fragments().len(), 1);
    assert_eq!(ctx.registry().load_passes(), passes);
}

#[tokio::test]
async fn registered_types_are_listed_sorted() {
    let ctx = TestContext::new(&[])
        .with_kind(RecordingKind::new("text/zeta"))
        .with_kind(RecordingKind::new("application/json"));

    assert_eq!(
        ctx.registry().registered_types(),
        vec!["application/json", "text/zeta"]
    );
    assert!(ctx.registry().is_registered("text/zeta"));
    assert!(ctx.registry().unregister_type("text/missing").is_none());
}

#[tokio::test]
async fn removed_unknown_nodes_are_forgotten() {
    let ctx = TestContext::new(&[("text/later", "1")]);
    ctx.start().await;
    let pending = ctx.registry().unknown_nodes("text/later");
    assert_eq!(pending.len(), 1);

    ctx.document().remove(pending[0]).unwrap();
    ctx.settle().await;
    assert!(ctx.registry().unknown_nodes("text/later").is_empty());

    let later = RecordingKind::new("text/later");
    assert!(ctx.registry().register_type(later).unwrap().is_empty());
}

#[tokio::test]
async fn unknown_nodes_added_later_are_remembered() {
    let ctx = TestContext::new(&[]);
    ctx.start().await;
    let doc = ctx.document();
    let node = doc.build(
        &VNode::element("x-fragment")
            .with_attribute("type", "text/later")
            .with_text("x"),
    );
    doc.append_child(doc.root(), node).unwrap();
    ctx.settle().await;

    assert_eq!(ctx.registry().unknown_nodes("text/later"), vec![node]);
}
