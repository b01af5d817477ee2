use tessera::VNode;

use crate::helpers::*;

#[tokio::test]
async fn each_node_is_wrapped_once() {
    let kind = RecordingKind::new("text/plain");
    let ctx = TestContext::new(&[("text/plain", "a"), ("text/plain", "b")]).with_kind(kind.clone());
    let first = ctx.start().await;
    let second = ctx.registry().discover_all().unwrap();

    assert_eq!(first, second);
    assert_eq!(kind.constructed(), 2);
    for fragment in &first {
        let again = ctx.registry().setup_node(fragment.node()).unwrap();
        assert_eq!(again.as_ref(), Some(fragment));
        assert_eq!(ctx.registry().fragment(fragment.node()).as_ref(), Some(fragment));
    }
}

#[tokio::test]
async fn non_fragment_nodes_are_not_wrapped() {
    let ctx = TestContext::new(&[("text/plain", "a")]).with_kind(RecordingKind::new("text/plain"));
    ctx.start().await;
    let doc = ctx.document();

    assert!(ctx.registry().setup_node(doc.root()).unwrap().is_none());
    // A fragment tag without a type is ordinary content.
    let untyped = doc.build(&VNode::element("x-fragment").with_text("plain"));
    doc.append_child(doc.root(), untyped).unwrap();
    ctx.settle().await;
    assert!(ctx.registry().fragment(untyped).is_none());
}

#[tokio::test]
async fn added_subtrees_are_discovered_and_loaded() {
    let kind = RecordingKind::new("text/plain");
    let ctx = TestContext::new(&[("text/plain", "a")]).with_kind(kind.clone());
    ctx.start().await;
    let doc = ctx.document();

    let subtree = doc.build(
        &VNode::element("article")
            .with_child(fragment_vnode("text/plain", "b"))
            .with_child(VNode::element("div").with_child(fragment_vnode("text/plain", "c"))),
    );
    doc.append_child(doc.root(), subtree).unwrap();
    ctx.settle().await;

    let fragments = ctx.registry().fragments();
    assert_eq!(fragments.len(), 3);
    let raws: Vec<String> = fragments.iter().map(|f| f.raw().unwrap()).collect();
    assert_eq!(raws, vec!["a", "b", "c"]);
    assert!(fragments.iter().all(|f| f.is_loaded()));
    assert_eq!(kind.loaded().len(), 3);
}

#[tokio::test]
async fn removed_subtrees_unload_every_fragment_inside() {
    let ctx = TestContext::new(&[("text/plain", "a")]).with_kind(RecordingKind::new("text/plain"));
    ctx.start().await;
    let doc = ctx.document();
    let subtree = doc.build(
        &VNode::element("article")
            .with_child(fragment_vnode("text/plain", "b"))
            .with_child(fragment_vnode("text/plain", "c")),
    );
    doc.append_child(doc.root(), subtree).unwrap();
    ctx.settle().await;
    let added: Vec<_> = ctx.registry().fragments().into_iter().skip(1).collect();

    doc.remove(subtree).unwrap();
    ctx.settle().await;

    assert!(added.iter().all(|f| f.is_unloaded()));
    assert_eq!(ctx.registry().fragments().len(), 1);
}

#[tokio::test]
async fn nodes_added_before_discovery_are_picked_up_by_it() {
    let ctx = TestContext::new(&[]).with_kind(RecordingKind::new("text/plain"));
    let doc = ctx.document();
    let node = doc.build(&fragment_vnode("text/plain", "late"));
    doc.append_child(doc.root(), node).unwrap();

    let fragments = ctx.start().await;
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].node(), node);
}
