use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tessera::{ChangeContext, ContextToken, FragmentState, ScopedWrite};

use crate::helpers::*;

#[tokio::test]
async fn writes_inside_a_scope_are_unobserved() {
    let ctx = TestContext::new(&[("text/plain", "hello")]).with_kind(RecordingKind::new("text/plain"));
    let fragment = ctx.start().await.remove(0);
    let changes = record_changes(&fragment);
    let events = record_text_events(&fragment);
    let token = ContextToken::new();
    let text = ctx.document().children(fragment.node())[0];

    let returned = fragment
        .run_without_observing(ScopedWrite::new(token), |doc| {
            doc.set_text(text, "hello world")?;
            Ok(42)
        })
        .unwrap();
    ctx.settle().await;

    assert_eq!(returned, 42);
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(*changes.lock().unwrap(), vec![ChangeContext::Token(token)]);
    assert_eq!(fragment.raw().unwrap(), "hello world");
    assert_eq!(fragment.state(), FragmentState::Observing);
}

#[tokio::test]
async fn pending_edits_are_flushed_before_the_scope() {
    let ctx = TestContext::new(&[("text/plain", "a")]).with_kind(RecordingKind::new("text/plain"));
    let fragment = ctx.start().await.remove(0);
    let changes = record_changes(&fragment);
    let events = record_text_events(&fragment);
    let token = ContextToken::new();

    fragment.set_raw("a1").unwrap();
    let text = ctx.document().children(fragment.node())[0];
    fragment
        .run_without_observing(ScopedWrite::new(token), |doc| {
            doc.set_text(text, "a12")?;
            Ok(())
        })
        .unwrap();
    ctx.settle().await;

    assert_eq!(
        *events.lock().unwrap(),
        vec![TextEvent::Inserted(1, "1".to_string())]
    );
    assert_eq!(
        *changes.lock().unwrap(),
        vec![
            ChangeContext::Fragment(fragment.id()),
            ChangeContext::Token(token)
        ]
    );
}

#[tokio::test]
async fn observation_resumes_after_scope() {
    let ctx = TestContext::new(&[("text/plain", "a")]).with_kind(RecordingKind::new("text/plain"));
    let fragment = ctx.start().await.remove(0);
    let events = record_text_events(&fragment);
    let states = Arc::new(std::sync::Mutex::new(Vec::new()));

    let inner = fragment.clone();
    let sink = states.clone();
    fragment
        .run_without_observing(ScopedWrite::new(fragment.id()), move |_| {
            sink.lock().unwrap().push(inner.state());
            Ok(())
        })
        .unwrap();
    fragment.set_raw("ab").unwrap();
    ctx.settle().await;

    assert_eq!(*states.lock().unwrap(), vec![FragmentState::Paused]);
    assert_eq!(
        *events.lock().unwrap(),
        vec![TextEvent::Inserted(1, "b".to_string())]
    );
}

#[tokio::test]
async fn nested_scopes_resume_once() {
    let ctx = TestContext::new(&[("text/plain", "a")]).with_kind(RecordingKind::new("text/plain"));
    let fragment = ctx.start().await.remove(0);
    let events = record_text_events(&fragment);
    let text = ctx.document().children(fragment.node())[0];

    let outer = fragment.clone();
    fragment
        .run_without_observing(ScopedWrite::new(ContextToken::new()), move |doc| {
            outer.run_without_observing(ScopedWrite::new(ContextToken::new()), |doc| {
                doc.set_text(text, "inner")?;
                Ok(())
            })?;
            // Still inside the outer scope.
            assert_eq!(outer.state(), FragmentState::Paused);
            doc.set_text(text, "outer")?;
            Ok(())
        })
        .unwrap();
    ctx.settle().await;

    assert!(events.lock().unwrap().is_empty());
    assert_eq!(fragment.state(), FragmentState::Observing);
}

#[tokio::test]
async fn unchanged_content_can_skip_notification() {
    let ctx = TestContext::new(&[("text/plain", "same")]).with_kind(RecordingKind::new("text/plain"));
    let fragment = ctx.start().await.remove(0);
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = calls.clone();
    fragment.register_on_changed(move |_, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    let text = ctx.document().children(fragment.node())[0];

    fragment
        .run_without_observing(
            ScopedWrite::new(ContextToken::new()).skip_if_unchanged(),
            |doc| {
                doc.set_text(text, "different")?;
                doc.set_text(text, "same")?;
                Ok(())
            },
        )
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    fragment
        .run_without_observing(
            ScopedWrite::new(ContextToken::new()).skip_if_unchanged(),
            |doc| {
                doc.set_text(text, "different")?;
                Ok(())
            },
        )
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scoped_writes_after_unload_fail() {
    let ctx = TestContext::new(&[("text/plain", "a")]).with_kind(RecordingKind::new("text/plain"));
    let fragment = ctx.start().await.remove(0);
    fragment.unload();

    let err = fragment
        .run_without_observing(ScopedWrite::new(ContextToken::new()), |_| Ok(()))
        .unwrap_err();
    assert!(err.is_unloaded());
}
