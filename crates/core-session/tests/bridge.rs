mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{Harness, harness, key, notifications, replayed, spawn_engine};
use core_config::EditorConfig;
use core_rpc::{Message, RpcError};
use core_session::{BridgeError, ChannelLink, FrontendEvent, Rect, Session};
use core_text::Size;
use core_view::{LineRange, ViewError};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn defined_style_is_queryable_and_undefined_one_is_not() {
    let mut h = harness();
    h.engine_says(json!({
        "method": "new_styles",
        "params": { "styles": [[3, { "foreground": 0xFFAA0000u32, "bold": true }]] }
    }));
    h.session.poll_inbox().unwrap();

    let style = h.session.style(3).unwrap();
    assert!(style.bold);
    assert!(!style.italic);
    assert_eq!(style.foreground, 0xFFAA0000);
    assert_eq!(
        h.session.style(4),
        Err(BridgeError::View(ViewError::UndefinedStyle(4)))
    );
    assert!(h.session.is_open());
    assert_eq!(h.frontend(), vec![FrontendEvent::StylesChanged(vec![3])]);
}

#[tokio::test]
async fn first_fetch_goes_to_the_engine() {
    let mut h = harness();
    assert!(h.session.line(0).is_none());
    assert!(h.session.line_or_placeholder(0).unwrap().is_placeholder());
    let sent = h.sent();
    assert!(matches!(
        &sent[..],
        [Message::Request(r)] if r.method == "get_line" && r.params == json!({ "line": 0 })
    ));

    h.respond(
        0,
        json!({ "text": "fn main() {}", "cursor": 2, "selection": null }),
    );
    let line = h.session.fetch_line(0).await.unwrap().unwrap();
    assert_eq!(line.text, "fn main() {}");
    assert_eq!(line.cursor, Some(2));
    assert_eq!(line.selection, None);
    assert!(!line.is_placeholder());
    // Already in flight, so no duplicate request went out.
    assert!(h.sent().is_empty());
}

#[tokio::test]
async fn fetch_line_awaits_the_reply() {
    let Harness {
        mut session,
        outbound,
        handle,
        ..
    } = harness();
    let engine = spawn_engine(outbound, handle, &["alpha", "beta"]);

    let line = session.fetch_line(1).await.unwrap().unwrap();
    assert_eq!(line.text, "beta");
    // Cached now: no second request.
    let again = session.fetch_line(1).await.unwrap().unwrap();
    assert_eq!(again, line);
    assert_eq!(session.fetch_line(7).await.unwrap(), None);

    let requests = engine
        .seen
        .lock()
        .unwrap()
        .iter()
        .filter(|m| matches!(m, Message::Request(_)))
        .count();
    assert_eq!(requests, 2);
}

#[tokio::test]
async fn reply_racing_an_invalidation_is_refetched() {
    let mut h = harness();
    h.session.line_or_placeholder(0).unwrap();
    let sent = h.sent();
    assert!(matches!(&sent[..], [Message::Request(r)] if r.method == "get_line" && r.id == 0));

    // The engine edits line 0 and the old reply is already on the wire.
    h.engine_says(json!({ "method": "invalidate", "params": { "start": 0, "end": 1 } }));
    h.respond(0, json!({ "text": "old" }));
    h.session.poll_inbox().unwrap();
    assert!(h.session.line(0).is_none());

    let sent = h.sent();
    assert!(matches!(&sent[..], [Message::Request(r)] if r.method == "get_line" && r.id == 1));
    h.respond(1, json!({ "text": "new" }));
    h.session.poll_inbox().unwrap();
    assert_eq!(h.session.line(0).unwrap().text, "new");
    assert_eq!(
        h.frontend(),
        vec![
            FrontendEvent::LinesInvalidated(LineRange::new(0, 1)),
            FrontendEvent::LineReady(0),
        ]
    );
}

#[tokio::test]
async fn invalidation_forces_a_fresh_fetch() {
    let Harness {
        mut session,
        outbound,
        handle,
        ..
    } = harness();
    let engine = spawn_engine(outbound, handle.clone(), &["one", "two", "three"]);

    assert_eq!(session.fetch_line(2).await.unwrap().unwrap().text, "three");
    engine.doc.lock().unwrap()[2] = "THREE".into();
    handle.deliver_frame(
        json!({ "method": "invalidate", "params": { "start": 1 } }).to_string(),
    );
    session.poll_inbox().unwrap();
    assert_eq!(session.fetch_line(2).await.unwrap().unwrap().text, "THREE");
}

#[tokio::test]
async fn queued_invalidation_applies_before_a_cached_read() {
    let Harness {
        mut session,
        outbound,
        handle,
        ..
    } = harness();
    let engine = spawn_engine(outbound, handle.clone(), &["one", "two", "three"]);

    assert_eq!(session.fetch_line(2).await.unwrap().unwrap().text, "three");
    engine.doc.lock().unwrap()[2] = "THREE".into();
    assert!(handle.deliver_frame(
        json!({ "method": "invalidate", "params": { "start": 1 } }).to_string(),
    ));
    assert_eq!(session.fetch_line(2).await.unwrap().unwrap().text, "THREE");
}

#[tokio::test]
async fn placeholder_read_sees_queued_invalidation() {
    let mut h = harness();
    h.session.line_or_placeholder(0).unwrap();
    h.sent();
    h.respond(0, json!({ "text": "old" }));
    assert_eq!(h.session.line_or_placeholder(0).unwrap().text, "old");

    h.engine_says(json!({ "method": "invalidate", "params": { "start": 0, "end": 1 } }));
    assert!(h.session.line_or_placeholder(0).unwrap().is_placeholder());
    let sent = h.sent();
    assert!(matches!(&sent[..], [Message::Request(r)] if r.method == "get_line" && r.id == 1));
}

#[tokio::test]
async fn queued_engine_error_fails_the_next_fetch() {
    let mut h = harness();
    h.session.line_or_placeholder(3).unwrap();
    h.sent();
    h.engine_says(json!({ "id": 0, "error": { "message": "busy", "code": 9 } }));
    let err = h.session.fetch_line(3).await.unwrap_err();
    assert_eq!(err, BridgeError::Rpc(RpcError::new("busy", 9)));
    assert!(h.sent().is_empty());
}

#[tokio::test]
async fn shrinking_document_drops_trailing_lines() {
    let mut h = harness();
    h.session.line_or_placeholder(5).unwrap();
    h.sent();
    h.respond(0, json!({ "text": "tail" }));
    h.session.poll_inbox().unwrap();
    assert!(h.session.line(5).is_some());

    h.engine_says(json!({
        "method": "invalidate",
        "params": { "start": 0, "end": 0, "total_lines": 3 }
    }));
    h.session.poll_inbox().unwrap();
    assert_eq!(h.session.total_lines(), Some(3));
    assert!(h.session.line(5).is_none());
    assert_eq!(h.session.fetch_line(5).await.unwrap(), None);
    assert!(h.sent().is_empty());
}

#[tokio::test]
async fn engine_error_fails_only_that_fetch() {
    let mut h = harness();
    h.session.line_or_placeholder(0).unwrap();
    h.sent();
    h.engine_says(json!({ "id": 0, "error": { "message": "busy", "code": 9 } }));
    let err = h.session.fetch_line(0).await.unwrap_err();
    assert_eq!(err, BridgeError::Rpc(RpcError::new("busy", 9)));
    assert!(!err.is_fatal());
    assert!(h.session.is_open());
    h.session.insert_text("x").unwrap();
}

#[tokio::test]
async fn whole_document_has_its_own_request() {
    let Harness {
        mut session,
        outbound,
        handle,
        ..
    } = harness();
    let engine = spawn_engine(outbound, handle, &["a", "b", "c"]);
    assert_eq!(session.fetch_document().await.unwrap(), "a\nb\nc");
    let methods: Vec<String> = engine
        .seen
        .lock()
        .unwrap()
        .iter()
        .filter_map(|m| m.method().map(str::to_string))
        .collect();
    assert_eq!(methods, vec!["get_document".to_string()]);
}

#[tokio::test]
async fn undefined_style_on_render_aborts_the_session() {
    let mut h = harness();
    h.session.line_or_placeholder(0).unwrap();
    h.sent();
    h.respond(0, json!({ "text": "let x", "styles": [0, 3, 5] }));
    h.session.poll_inbox().unwrap();

    let err = h.session.styled_line(0).unwrap_err();
    assert_eq!(err, BridgeError::View(ViewError::UndefinedStyle(5)));
    assert!(!h.session.is_open());
    assert!(matches!(
        h.frontend().last(),
        Some(FrontendEvent::SessionAborted(_))
    ));
    assert!(matches!(
        h.session.insert_text("x"),
        Err(BridgeError::SessionAborted(_))
    ));
}

#[tokio::test]
async fn styled_line_resolves_defined_styles() {
    let mut h = harness();
    h.engine_says(json!({
        "method": "new_styles",
        "params": { "styles": [[5, { "italic": true }]] }
    }));
    h.session.line_or_placeholder(0).unwrap();
    h.respond(0, json!({ "text": "let x", "styles": [0, 3, 5] }));
    h.session.poll_inbox().unwrap();

    let styled = h.session.styled_line(0).unwrap().unwrap();
    assert_eq!(styled.spans.len(), 1);
    assert!(styled.spans[0].style.italic);
    assert_eq!(h.session.styled_line(1).unwrap(), None);
}

#[tokio::test]
async fn overflowing_style_span_in_a_reply_aborts_the_session() {
    let mut h = harness();
    h.session.line_or_placeholder(0).unwrap();
    h.sent();
    h.respond(0, json!({ "text": "ab", "styles": [u64::MAX, 1, 0] }));
    let err = h.session.poll_inbox().unwrap_err();
    assert!(matches!(err, BridgeError::Protocol(_)));
    assert!(!h.session.is_open());
    assert!(h.session.line(0).is_none());
    assert!(matches!(
        h.frontend().last(),
        Some(FrontendEvent::SessionAborted(_))
    ));
}

#[tokio::test]
async fn malformed_frame_aborts_the_session() {
    let mut h = harness();
    assert!(h.handle.deliver_frame("{\"params\": {}}"));
    let err = h.session.poll_inbox().unwrap_err();
    assert!(matches!(err, BridgeError::Protocol(_)));
    assert!(err.is_fatal());
    assert!(!h.session.is_open());
    // The link was released.
    assert!(h.outbound.recv().await.is_none());
}

#[tokio::test]
async fn unknown_response_id_is_a_violation() {
    let mut h = harness();
    h.respond(41, json!({ "text": "?" }));
    assert!(matches!(
        h.session.poll_inbox(),
        Err(BridgeError::Protocol(core_rpc::ProtocolViolation::UnknownResponse(41)))
    ));
}

#[tokio::test]
async fn engine_notifications_reach_the_ui() {
    let mut h = harness();
    h.engine_says(json!({ "method": "content_size", "params": { "width": 80.0, "height": 12.5 } }));
    h.engine_says(json!({ "method": "scroll_to", "params": { "line": 4, "col": 2 } }));
    h.engine_says(json!({ "method": "set_pasteboard", "params": { "text": "copied" } }));
    h.engine_says(json!({ "method": "available_themes", "params": { "themes": ["base16"] } }));
    assert_eq!(h.session.poll_inbox().unwrap(), 4);

    let size = Size {
        width: 80.0,
        height: 12.5,
    };
    assert_eq!(h.session.document_size(), size);
    assert_eq!(
        h.frontend(),
        vec![
            FrontendEvent::DocumentSize(size),
            FrontendEvent::ScrollTo { line: 4, col: 2 },
            FrontendEvent::ClipboardWrite("copied".into()),
            FrontendEvent::Rpc {
                method: "available_themes".into(),
                params: json!({ "themes": ["base16"] }),
            },
        ]
    );
}

#[tokio::test]
async fn user_intents_become_notifications() {
    let mut h = harness();
    h.session.insert_text("héllo").unwrap();
    h.session.do_command("delete_backward").unwrap();
    h.session.do_gesture(3, 1, "point_select").unwrap();
    assert_eq!(
        notifications(&h.sent()),
        vec![
            ("insert".to_string(), json!({ "chars": "héllo" })),
            ("delete_backward".to_string(), json!({})),
            (
                "gesture".to_string(),
                json!({ "line": 3, "col": 1, "ty": "point_select" })
            ),
        ]
    );
}

#[tokio::test]
async fn intents_posted_from_another_thread_are_applied_in_order() {
    let mut h = harness();
    let handle = h.session.handle();
    std::thread::spawn(move || {
        handle.insert_text("a");
        handle.do_command("newline");
        let mut changes = core_rpc::Map::new();
        changes.insert("tab_size".into(), json!(2));
        handle.update_config(changes);
    })
    .join()
    .unwrap();
    assert!(h.sent().is_empty());
    assert_eq!(h.session.poll_inbox().unwrap(), 3);
    let methods: Vec<String> = notifications(&h.sent()).into_iter().map(|(m, _)| m).collect();
    assert_eq!(methods, vec!["insert", "newline", "update_config"]);
    assert_eq!(h.session.config().tab_size, 2);
}

#[tokio::test]
async fn unchanged_frame_is_not_resent() {
    let mut h = harness();
    let rect = Rect::new(0.0, 120.0, 640.0, 480.0);
    h.session.frame_changed(rect).unwrap();
    h.session.frame_changed(rect).unwrap();
    h.session.frame_changed(Rect::new(0.0, 140.0, 640.0, 480.0)).unwrap();
    let sent = notifications(&h.sent());
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent[0],
        (
            "viewport_change".to_string(),
            json!({ "x": 0.0, "y": 120.0, "width": 640.0, "height": 480.0 })
        )
    );
}

#[tokio::test]
async fn config_updates_send_only_changes() {
    let mut h = harness();
    h.session.update_config(core_rpc::Map::new()).unwrap();
    assert!(h.sent().is_empty());

    let next = EditorConfig {
        word_wrap: false,
        ..EditorConfig::default()
    };
    h.session.set_editor_config(next.clone()).unwrap();
    h.session.set_editor_config(next).unwrap();
    assert_eq!(
        notifications(&h.sent()),
        vec![(
            "update_config".to_string(),
            json!({ "changes": { "word_wrap": false } })
        )]
    );
}

#[tokio::test]
async fn mistyped_option_is_not_forwarded() {
    let mut h = harness();
    let changes = json!({ "tab_size": "wide", "auto_indent": false, "engine_theme": "dark" });
    h.session
        .update_config(changes.as_object().cloned().unwrap())
        .unwrap();
    assert_eq!(h.session.config().tab_size, 4);
    assert!(!h.session.config().auto_indent);
    assert_eq!(
        notifications(&h.sent()),
        vec![(
            "update_config".to_string(),
            json!({ "changes": { "auto_indent": false, "engine_theme": "dark" } })
        )]
    );

    let only_bad = json!({ "tab_size": -1 });
    h.session
        .update_config(only_bad.as_object().cloned().unwrap())
        .unwrap();
    assert!(h.sent().is_empty());
}

#[tokio::test]
async fn font_change_drops_memoized_widths() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let (link, mut outbound) = ChannelLink::new();
    let (driver, _timers) = core_input::RecordingTimerDriver::new();
    let measure = move |text: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
        Size {
            width: text.chars().count() as f64 * 7.0,
            height: 14.0,
        }
    };
    let (mut session, _events) =
        Session::with_timer_driver(link, measure, EditorConfig::default(), driver).unwrap();
    let handle = session.handle();

    let ask = |id: u64| {
        handle.deliver_frame(
            json!({ "id": id, "method": "measure_width", "params": { "text": "abc" } })
                .to_string(),
        );
    };
    ask(1);
    ask(2);
    session.poll_inbox().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let reply = core_rpc::decode(&outbound.try_recv().unwrap()).unwrap();
    assert_eq!(
        reply,
        Message::Response(core_rpc::Response::ok(1, json!({ "width": 21.0, "height": 14.0 })))
    );

    let mut changes = core_rpc::Map::new();
    changes.insert("font_size".into(), json!(18.0));
    session.update_config(changes).unwrap();
    ask(3);
    session.poll_inbox().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unknown_engine_request_gets_an_error_reply() {
    let mut h = harness();
    h.engine_says(json!({ "id": 9, "method": "frobnicate", "params": {} }));
    h.session.poll_inbox().unwrap();
    let sent = h.sent();
    assert!(matches!(
        &sent[..],
        [Message::Response(r)] if r.id == 9 && r.outcome.as_ref().is_err_and(|e| e.code == -32601)
    ));
    assert!(h.session.is_open());
}

#[tokio::test]
async fn link_closure_aborts_the_session() {
    let mut h = harness();
    h.handle.link_closed(Some("engine exited with status 3".into()));
    let err = h.session.poll_inbox().unwrap_err();
    assert_eq!(
        err,
        BridgeError::SessionAborted("engine exited with status 3".into())
    );
    assert_eq!(
        h.frontend(),
        vec![FrontendEvent::SessionAborted(
            "engine exited with status 3".into()
        )]
    );
}

#[tokio::test]
async fn shutdown_releases_everything_once() {
    let mut h = harness();
    h.session.enable_input_interception().unwrap();
    h.session.submit_key(key("a")).unwrap();
    h.engine_says(json!({
        "method": "input_disposition",
        "params": { "id": 0, "disposition": { "delay": 250 } }
    }));
    h.session.poll_inbox().unwrap();
    h.session.line_or_placeholder(0).unwrap();

    h.session.shutdown();
    h.session.shutdown();
    assert!(h.timers.snapshot().cancelled.contains(&0));
    assert_eq!(h.session.cache().pending().count(), 0);
    assert_eq!(h.session.insert_text("late"), Err(BridgeError::SessionClosed));
    assert_eq!(h.session.fetch_line(0).await, Err(BridgeError::SessionClosed));
    assert!(replayed(&h.frontend()).is_empty());

    h.sent();
    assert!(h.outbound.recv().await.is_none());
}

#[tokio::test]
async fn dropping_the_session_closes_the_link() {
    let h = harness();
    let Harness {
        session,
        mut outbound,
        ..
    } = h;
    drop(session);
    assert!(outbound.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn tokio_timers_post_expiry_back_to_the_session() {
    let (link, mut outbound) = ChannelLink::new();
    let (mut session, mut events) = Session::new(
        link,
        core_text::MonospaceMeasure::default(),
        EditorConfig::default(),
    )
    .unwrap();
    session.enable_input_interception().unwrap();
    session.submit_key(key("q")).unwrap();
    session
        .handle()
        .deliver_frame(
            json!({
                "method": "input_disposition",
                "params": { "id": 0, "disposition": { "delay": 100 } }
            })
            .to_string(),
        );
    session.poll_inbox().unwrap();
    assert!(events.try_recv().is_err());

    tokio::time::timeout(Duration::from_secs(1), session.process_next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        events.try_recv(),
        Ok(FrontendEvent::Replay { id: 0, .. })
    ));
    let mut methods = Vec::new();
    while let Ok(frame) = outbound.try_recv() {
        if let Some(m) = core_rpc::decode(&frame).unwrap().method() {
            methods.push(m.to_string());
        }
    }
    assert_eq!(
        methods,
        vec!["enable_input_interception", "key_event", "clear_pending"]
    );
}
