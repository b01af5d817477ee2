use tessera::{Query, Selector, VNode};

use crate::helpers::*;

fn gallery() -> VNode {
    VNode::element("body")
        .with_child(fragment_vnode("text/plain", "one").with_attribute("class", "note big"))
        .with_child(fragment_vnode("application/json", "{}").with_attribute("class", "note"))
        .with_child(fragment_vnode("text/plain", "three"))
        .with_child(VNode::element("p").with_attribute("class", "note").with_text("not a fragment"))
}

async fn gallery_context() -> TestContext {
    let ctx = TestContext::from_vnode(&gallery())
        .with_kind(RecordingKind::new("text/plain"))
        .with_kind(RecordingKind::new("application/json"));
    ctx.start().await;
    ctx
}

fn raws(fragments: &[tessera::Fragment]) -> Vec<String> {
    fragments.iter().map(|f| f.raw().unwrap()).collect()
}

#[tokio::test]
async fn selectors_match_wrapped_fragments_only() {
    let ctx = gallery_context().await;
    let registry = ctx.registry();

    let notes = registry.find_all(Query::try_from(".note").unwrap()).unwrap();
    assert_eq!(raws(&notes), vec!["one", "{}"]);

    let plain = registry
        .find_all(Query::try_from(r#"x-fragment[type="text/plain"]"#).unwrap())
        .unwrap();
    assert_eq!(raws(&plain), vec!["one", "three"]);

    let big = registry
        .find(Selector::tag("x-fragment").with_class("big").into())
        .unwrap()
        .unwrap();
    assert_eq!(big.raw().unwrap(), "one");

    assert!(registry.find(Query::try_from("p").unwrap()).unwrap().is_none());
}

#[tokio::test]
async fn lists_union_without_duplicates_in_discovery_order() {
    let ctx = gallery_context().await;
    let registry = ctx.registry();
    let fragments = registry.fragments();

    let query = Query::List(vec![
        fragments[2].clone().into(),
        Query::try_from(".note").unwrap(),
        fragments[0].node().into(),
    ]);
    let found = registry.find_all(query).unwrap();
    assert_eq!(found, fragments);
}

#[tokio::test]
async fn stale_handles_and_plain_nodes_find_nothing() {
    let ctx = gallery_context().await;
    let registry = ctx.registry();
    let fragment = registry.fragments().remove(0);
    let paragraph = ctx.document().children(ctx.document().root())[3];

    assert!(registry.find(paragraph.into()).unwrap().is_none());
    fragment.unload();
    assert!(registry.find(fragment.clone().into()).unwrap().is_none());
    assert!(registry.find(fragment.node().into()).unwrap().is_none());
}

#[tokio::test]
async fn malformed_selectors_are_rejected() {
    let err = Query::try_from("x-fragment p").unwrap_err();
    assert!(err.is_validation_error());

    let err: tessera::Error = Selector::parse("[type=").unwrap_err().into();
    assert!(err.is_validation_error());
    assert_eq!(err.module(), "registry");
}
