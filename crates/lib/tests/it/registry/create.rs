use tessera::{CreateOptions, VNode};

use crate::helpers::*;

#[tokio::test]
async fn created_fragments_are_wrapped_and_loaded() {
    let kind = RecordingKind::automated("text/shout");
    let ctx = TestContext::from_vnode(&VNode::element("body").with_child(VNode::element("main")))
        .with_kind(kind.clone());
    ctx.start().await;
    let main = ctx.document().children(ctx.document().root())[0];

    let fragment = ctx
        .registry()
        .create(
            "text/shout",
            "fresh",
            CreateOptions {
                auto: true,
                parent: Some(main),
                class: Some("note".to_string()),
            },
        )
        .unwrap();
    ctx.settle().await;

    let doc = ctx.document();
    assert_eq!(doc.parent(fragment.node()), Some(main));
    assert_eq!(doc.attribute(fragment.node(), "type").as_deref(), Some("text/shout"));
    assert_eq!(fragment.class().as_deref(), Some("note"));
    assert!(fragment.auto());
    assert_eq!(fragment.raw().unwrap(), "fresh");
    assert!(fragment.is_loaded());
    assert_eq!(kind.constructed(), 1);

    let companion = fragment.companion().expect("companion rendered");
    assert_eq!(doc.attribute(companion, "class").as_deref(), Some("note"));
    assert_eq!(ctx.registry().fragment(fragment.node()), Some(fragment));
}

#[tokio::test]
async fn creating_an_unregistered_type_fails() {
    let ctx = TestContext::new(&[]);
    ctx.start().await;

    let err = ctx
        .registry()
        .create("text/unknown", "x", CreateOptions::default())
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(ctx.document().children(ctx.document().root()).is_empty());
}

#[tokio::test]
async fn created_fragments_respect_the_load_gate() {
    let kind = RecordingKind::new("text/plain");
    let ctx = TestContext::new(&[]).with_kind(kind.clone());
    ctx.registry().discover_all().unwrap();

    let fragment = ctx
        .registry()
        .create("text/plain", "waiting", CreateOptions::default())
        .unwrap();
    ctx.settle().await;
    assert!(!fragment.is_loaded());

    ctx.registry().mark_types_installed();
    ctx.settle().await;
    assert!(fragment.is_loaded());
    assert_eq!(kind.loaded(), vec![fragment.node()]);
}
