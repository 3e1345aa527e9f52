#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use core_config::EditorConfig;
use core_events::{InputEvent, KeyToken, Modifiers};
use core_input::{RecordedTimers, RecordingTimerDriver};
use core_rpc::{Message, Value, decode};
use core_session::{ChannelLink, FrontendEvent, FrontendEvents, Session, SessionHandle};
use core_text::MonospaceMeasure;
use serde_json::json;
use tokio::sync::mpsc;

pub struct Harness {
    pub session: Session,
    pub events: FrontendEvents,
    pub outbound: mpsc::UnboundedReceiver<String>,
    pub handle: SessionHandle,
    pub timers: RecordedTimers,
}

/// Session over an in-process link with hand-driven timers.
pub fn harness() -> Harness {
    let (link, outbound) = ChannelLink::new();
    let (driver, timers) = RecordingTimerDriver::new();
    let (session, events) = Session::with_timer_driver(
        link,
        MonospaceMeasure::default(),
        EditorConfig::default(),
        driver,
    )
    .unwrap();
    let handle = session.handle();
    Harness {
        session,
        events,
        outbound,
        handle,
        timers,
    }
}

impl Harness {
    /// Every frame the session has sent so far, decoded.
    pub fn sent(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            out.push(decode(&frame).unwrap());
        }
        out
    }

    pub fn frontend(&mut self) -> Vec<FrontendEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub fn engine_says(&self, value: Value) {
        assert!(self.handle.deliver_frame(value.to_string()));
    }

    pub fn respond(&self, id: u64, result: Value) {
        self.engine_says(json!({ "id": id, "result": result }));
    }
}

pub fn key(c: &str) -> InputEvent {
    InputEvent::new(KeyToken::Chars(c.into()), Modifiers::empty())
}

/// `(method, params)` of each notification, skipping requests and responses.
pub fn notifications(messages: &[Message]) -> Vec<(String, Value)> {
    messages
        .iter()
        .filter_map(|m| match m {
            Message::Notification(n) => Some((n.method.clone(), n.params.clone())),
            _ => None,
        })
        .collect()
}

pub fn replayed(events: &[FrontendEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|e| match e {
            FrontendEvent::Replay { id, .. } => Some(*id),
            _ => None,
        })
        .collect()
}

/// A scripted engine: answers `get_line` and `get_document` from `doc` and records every frame.
pub struct FakeEngine {
    pub doc: Arc<Mutex<Vec<String>>>,
    pub seen: Arc<Mutex<Vec<Message>>>,
}

pub fn spawn_engine(
    mut outbound: mpsc::UnboundedReceiver<String>,
    handle: SessionHandle,
    lines: &[&str],
) -> FakeEngine {
    let doc = Arc::new(Mutex::new(lines.iter().map(|s| s.to_string()).collect::<Vec<_>>()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (doc2, seen2) = (doc.clone(), seen.clone());
    tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let message = decode(&frame).unwrap();
            seen2.lock().unwrap().push(message.clone());
            if let Message::Request(r) = &message {
                let doc = doc2.lock().unwrap().clone();
                let reply = match r.method.as_str() {
                    "get_line" => {
                        let i = r.params["line"].as_u64().unwrap() as usize;
                        match doc.get(i) {
                            Some(text) => json!({ "id": r.id, "result": { "text": text } }),
                            None => json!({ "id": r.id, "result": null }),
                        }
                    }
                    "get_document" => json!({ "id": r.id, "result": doc.join("\n") }),
                    _ => json!({ "id": r.id, "error": { "message": "nope", "code": 4 } }),
                };
                handle.deliver_frame(reply.to_string());
            }
        }
    });
    FakeEngine { doc, seen }
}
