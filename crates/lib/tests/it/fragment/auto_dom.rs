use std::sync::Arc;

use tessera::{
    ChangeContext, FailurePhase, FragmentRegistry, InMemoryRenderCache, RequireReason,
    RuntimeConfig, VNode,
};

use crate::helpers::*;

fn auto_body(fragments: &[(&str, &str)]) -> VNode {
    fragments
        .iter()
        .fold(VNode::element("body"), |body, (type_id, raw)| {
            body.with_child(auto_fragment_vnode(type_id, raw))
        })
}

#[tokio::test]
async fn loading_an_auto_fragment_renders_its_companion() {
    let kind = RecordingKind::automated("text/shout");
    let ctx = TestContext::from_vnode(&auto_body(&[("text/shout", "a")])).with_kind(kind.clone());
    let fragment = ctx.start().await.remove(0);
    let doc = ctx.document();

    let companion = fragment.companion().expect("companion rendered");
    assert_eq!(doc.tag(companion).as_deref(), Some("x-auto-dom"));
    assert_eq!(
        doc.attribute(companion, "data-fragment-id"),
        Some(fragment.id().to_string())
    );
    assert_eq!(doc.next_sibling(fragment.node()), Some(companion));
    assert_eq!(doc.text_content(companion), "a");
    assert_eq!(kind.renders(), 1);
    assert_eq!(kind.requires(), vec![RequireReason::Load]);
    assert_eq!(fragment.auto_dom_renders(), 1);
    assert!(!fragment.is_auto_dom_dirty());
}

#[tokio::test]
async fn an_edit_recomputes_once_and_patches_in_place() {
    let kind = RecordingKind::automated("text/shout");
    let ctx = TestContext::from_vnode(&auto_body(&[("text/shout", "a")])).with_kind(kind.clone());
    let fragment = ctx.start().await.remove(0);
    let doc = ctx.document();
    let companion = fragment.companion().unwrap();
    let pre = doc.children(companion)[0];
    let changes = record_changes(&fragment);

    fragment.set_raw("ab").unwrap();
    ctx.settle().await;

    assert_eq!(kind.renders(), 2);
    assert_eq!(fragment.companion(), Some(companion));
    assert_eq!(doc.children(companion), vec![pre]);
    assert_eq!(doc.text_content(companion), "ab");
    assert!(!fragment.is_auto_dom_dirty());

    // The edit itself, then the splice under the companion's own token.
    let changes = changes.lock().unwrap().clone();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0], ChangeContext::Fragment(fragment.id()));
    assert!(matches!(changes[1], ChangeContext::Token(_)));
}

#[tokio::test]
async fn non_auto_fragments_never_render() {
    let kind = RecordingKind::automated("text/shout");
    let ctx = TestContext::new(&[("text/shout", "a")]).with_kind(kind.clone());
    let fragment = ctx.start().await.remove(0);

    fragment.set_raw("ab").unwrap();
    ctx.settle().await;

    assert_eq!(kind.renders(), 0);
    assert!(kind.requires().is_empty());
    assert_eq!(fragment.companion(), None);
}

#[tokio::test]
async fn toggling_auto_removes_and_restores_the_companion() {
    let kind = RecordingKind::automated("text/shout");
    let ctx = TestContext::from_vnode(&auto_body(&[("text/shout", "a")])).with_kind(kind.clone());
    let fragment = ctx.start().await.remove(0);
    let doc = ctx.document();
    let companion = fragment.companion().unwrap();
    let flags = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = flags.clone();
    fragment.register_on_auto_changed(move |_, enabled| sink.lock().unwrap().push(enabled));

    fragment.set_auto(false).unwrap();
    assert!(!fragment.auto());
    assert_eq!(fragment.companion(), None);
    assert!(!doc.is_connected(companion));
    assert!(fragment.is_auto_dom_dirty());

    fragment.set_auto(true).unwrap();
    ctx.settle().await;
    let restored = fragment.companion().expect("companion restored");
    assert_eq!(doc.next_sibling(fragment.node()), Some(restored));
    assert_eq!(kind.renders(), 2);
    assert_eq!(*flags.lock().unwrap(), vec![false, true]);
}

#[tokio::test]
async fn remote_auto_edits_are_followed() {
    let kind = RecordingKind::automated("text/shout");
    let ctx = TestContext::new(&[("text/shout", "a")]).with_kind(kind.clone());
    let fragment = ctx.start().await.remove(0);

    ctx.document()
        .set_attribute(fragment.node(), "auto", "")
        .unwrap();
    ctx.settle().await;
    assert!(fragment.auto());
    assert!(fragment.companion().is_some());

    ctx.document()
        .set_attribute(fragment.node(), "auto", "false")
        .unwrap();
    ctx.settle().await;
    assert!(!fragment.auto());
    assert_eq!(fragment.companion(), None);
}

#[tokio::test]
async fn autorun_switch_disables_background_renders() {
    let kind = RecordingKind::automated("text/shout");
    let config = RuntimeConfig {
        autorun_disabled: true,
        ..RuntimeConfig::default()
    };
    let ctx = TestContext::from_vnode(&auto_body(&[("text/shout", "a")]))
        .with_config(config)
        .with_kind(kind.clone());
    let fragment = ctx.start().await.remove(0);

    fragment.set_raw("ab").unwrap();
    ctx.settle().await;
    assert_eq!(kind.renders(), 0);
    assert_eq!(fragment.companion(), None);

    fragment.refresh_auto_dom().await.unwrap();
    assert_eq!(kind.renders(), 1);
    assert_eq!(ctx.document().text_content(fragment.companion().unwrap()), "ab");
}

#[tokio::test]
async fn unload_discards_a_pending_render() {
    let kind = RecordingKind::automated("text/shout");
    let ctx = TestContext::from_vnode(&auto_body(&[("text/shout", "a")])).with_kind(kind.clone());
    let fragment = ctx.start().await.remove(0);
    let companion = fragment.companion().unwrap();

    fragment.set_raw("ab").unwrap();
    // Queues the render without running it.
    ctx.document().deliver_mutations();
    fragment.unload();
    ctx.settle().await;

    assert_eq!(kind.renders(), 1);
    assert_eq!(fragment.companion(), None);
    assert!(!ctx.document().is_connected(companion));
}

#[tokio::test]
async fn render_failures_are_contained() {
    let broken = RecordingKind::automated("text/broken");
    broken.set_fail_render(true);
    let healthy = RecordingKind::automated("text/shout");
    let ctx = TestContext::from_vnode(&auto_body(&[("text/broken", "x"), ("text/shout", "y")]))
        .with_kind(broken.clone())
        .with_kind(healthy.clone());
    let mut failures = ctx.registry().subscribe_failures();
    let fragments = ctx.start().await;

    let failure = failures.try_recv().expect("failure reported");
    assert_eq!(failure.phase, FailurePhase::AutoDom);
    assert_eq!(failure.type_id, "text/broken");
    assert_eq!(failure.fragment, fragments[0].id());
    assert!(failure.message.contains("render refused"));

    assert!(fragments[0].is_auto_dom_dirty());
    assert_eq!(fragments[0].companion(), None);
    assert!(fragments[1].companion().is_some());

    broken.set_fail_render(false);
    fragments[0].set_raw("fixed").unwrap();
    ctx.settle().await;
    assert!(!fragments[0].is_auto_dom_dirty());
    assert_eq!(
        ctx.document().text_content(fragments[0].companion().unwrap()),
        "fixed"
    );
}

#[tokio::test]
async fn refresh_returns_render_errors() {
    let kind = RecordingKind::automated("text/shout");
    let ctx = TestContext::from_vnode(&auto_body(&[("text/shout", "a")])).with_kind(kind.clone());
    let fragment = ctx.start().await.remove(0);

    kind.set_fail_render(true);
    let err = fragment.refresh_auto_dom().await.unwrap_err();
    assert_eq!(err.module(), "fragment");
    assert!(fragment.is_auto_dom_dirty());
}

#[tokio::test]
async fn companion_mirrors_the_fragment_class() {
    let kind = RecordingKind::automated("text/shout");
    let body = VNode::element("body")
        .with_child(auto_fragment_vnode("text/shout", "a").with_attribute("class", "narrow"));
    let ctx = TestContext::from_vnode(&body).with_kind(kind);
    let fragment = ctx.start().await.remove(0);
    let doc = ctx.document();
    let companion = fragment.companion().unwrap();
    assert_eq!(doc.attribute(companion, "class").as_deref(), Some("narrow"));

    doc.set_attribute(fragment.node(), "class", "wide").unwrap();
    ctx.settle().await;
    assert_eq!(doc.attribute(companion, "class").as_deref(), Some("wide"));
}

#[tokio::test]
async fn renders_are_shared_through_the_cache() {
    let kind = RecordingKind::automated("text/shout");
    let cache = Arc::new(InMemoryRenderCache::new());
    let document = tessera::Document::from_vnode(&auto_body(&[
        ("text/shout", "same"),
        ("text/shout", "same"),
    ]))
    .unwrap();
    let registry =
        FragmentRegistry::with_cache(document, RuntimeConfig::default(), cache.clone());
    registry.register_type(kind.clone()).unwrap();
    let fragments = registry.discover_all().unwrap();
    registry.mark_types_installed();
    registry.settle().await;

    assert_eq!(kind.renders(), 1);
    assert_eq!(cache.len(), 1);
    for fragment in &fragments {
        let companion = fragment.companion().expect("companion rendered");
        assert_eq!(registry.document().text_content(companion), "same");
    }
}
