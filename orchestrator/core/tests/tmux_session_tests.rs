// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Session manager against a real tmux server. Skipped when tmux is not
//! installed.

use sc3_core::application::session_manager::{SessionError, SessionManager};
use sc3_core::domain::config::SessionManagerConfig;
use sc3_core::domain::events::SessionEvent;
use sc3_core::infrastructure::event_bus::{DomainEvent, EventBus};
use sc3_core::infrastructure::process::UnixProcessControl;
use sc3_core::infrastructure::tmux::TmuxBackend;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn tmux_available() -> bool {
    std::process::Command::new("tmux")
        .arg("-V")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn manager(bus: EventBus) -> SessionManager {
    SessionManager::new(
        Arc::new(TmuxBackend::default()),
        Arc::new(UnixProcessControl::new()),
        bus,
        SessionManagerConfig::default(),
    )
}

/// Unique per test process so parallel runs never share a session.
fn session_name(tag: &str) -> String {
    format!("sc3-itest-{tag}{}", std::process::id())
}

async fn wait_for_capture(mgr: &SessionManager, name: &str, needle: &str) -> String {
    let cancel = CancellationToken::new();
    let mut last = String::new();
    for _ in 0..50 {
        last = mgr.capture_panes(&cancel, name).await.unwrap();
        if last.contains(needle) {
            return last;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    last
}

#[tokio::test]
async fn send_capture_and_kill_live_session() {
    if !tmux_available() {
        eprintln!("tmux not installed; skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(EventBus::new(16));
    let cancel = CancellationToken::new();
    let name = session_name("m");

    mgr.create_session(&cancel, &name, "cat", &dir.path().to_string_lossy())
        .await
        .unwrap();

    let listed = mgr.list_sessions(&cancel).await.unwrap();
    assert!(listed.iter().any(|s| s.as_str() == name));

    mgr.send_keys(&cancel, &name, "hello from sc3", true).await.unwrap();
    let captured = wait_for_capture(&mgr, &name, "hello from sc3").await;
    assert!(captured.contains("hello from sc3"), "capture was {captured:?}");

    mgr.kill_session(&cancel, &name).await.unwrap();
    // Second kill of the same session is a no-op.
    mgr.kill_session(&cancel, &name).await.unwrap();

    match mgr.capture_panes(&cancel, &name).await {
        Err(SessionError::Backend { source, .. }) => assert!(source.is_gone(), "unexpected {source}"),
        other => panic!("expected missing session, got {other:?}"),
    }
}

#[tokio::test]
async fn exact_target_ignores_longer_session_name() {
    if !tmux_available() {
        eprintln!("tmux not installed; skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(EventBus::new(16));
    let cancel = CancellationToken::new();
    let short = session_name("x");
    let long = format!("{short}0");

    mgr.create_session(&cancel, &long, "cat", &dir.path().to_string_lossy())
        .await
        .unwrap();

    let err = mgr.capture_panes(&cancel, &short).await.unwrap_err();
    mgr.kill_session(&cancel, &short).await.unwrap();
    let still_listed = mgr.list_sessions(&cancel).await.unwrap();
    mgr.kill_session(&cancel, &long).await.unwrap();

    assert!(matches!(err, SessionError::Backend { ref source, .. } if source.is_gone()));
    assert!(still_listed.iter().any(|s| s.as_str() == long));
}

#[tokio::test]
async fn stream_reports_output_then_session_end() {
    if !tmux_available() {
        eprintln!("tmux not installed; skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let mgr = manager(bus);
    let cancel = CancellationToken::new();
    let name = session_name("s");

    mgr.create_session(&cancel, &name, "echo streamed-line; sleep 1", &dir.path().to_string_lossy())
        .await
        .unwrap();

    let streamed = tokio::time::timeout(
        Duration::from_secs(10),
        mgr.stream_output(&cancel, &name, Duration::from_millis(100)),
    )
    .await;
    mgr.kill_session(&cancel, &name).await.unwrap();
    streamed.expect("stream should end with the session").unwrap();

    let events = rx.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        DomainEvent::OutputChunk(chunk) if chunk.content.contains("streamed-line")
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, DomainEvent::Session(SessionEvent::SessionEnded { .. }))));
}
