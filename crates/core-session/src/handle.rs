//! Cross-thread entry points into a session and the notifications it emits toward the UI.

use core_events::{EventId, InputEvent};
use core_rpc::{Map, Value};
use core_text::Size;
use core_view::{LineRange, StyleId};
use tokio::sync::mpsc;
use tracing::trace;

/// Work queued for the session's confinement context.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// One raw frame from the engine.
    Frame(String),
    TimerFired(EventId),
    Insert(String),
    Command(String),
    UpdateConfig(Map<String, Value>),
    /// The engine side of the link went away.
    LinkClosed(Option<String>),
}

/// Clone + Send handle that posts work onto the owning [`crate::Session`]. Nothing posted here
/// touches session state until the session drains its inbox.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl SessionHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Inbound>) -> Self {
        Self { tx }
    }

    fn post(&self, item: Inbound) -> bool {
        let ok = self.tx.send(item).is_ok();
        if !ok {
            trace!(target: "session", "post_after_teardown");
        }
        ok
    }

    /// Deliver a frame received from the engine. Returns false once the session is gone.
    pub fn deliver_frame(&self, frame: impl Into<String>) -> bool {
        self.post(Inbound::Frame(frame.into()))
    }

    /// Report that the engine end closed, optionally with a reason.
    pub fn link_closed(&self, reason: Option<String>) -> bool {
        self.post(Inbound::LinkClosed(reason))
    }

    /// A delay armed for `id` elapsed.
    pub fn timer_fired(&self, id: EventId) -> bool {
        self.post(Inbound::TimerFired(id))
    }

    pub fn insert_text(&self, text: impl Into<String>) -> bool {
        self.post(Inbound::Insert(text.into()))
    }

    pub fn do_command(&self, name: impl Into<String>) -> bool {
        self.post(Inbound::Command(name.into()))
    }

    pub fn update_config(&self, changes: Map<String, Value>) -> bool {
        self.post(Inbound::UpdateConfig(changes))
    }
}

/// Visible viewport in measurement units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// What the UI must react to.
#[derive(Debug, Clone, PartialEq)]
pub enum FrontendEvent {
    /// Cached lines in the range were dropped; repaint them.
    LinesInvalidated(LineRange),
    /// A fetched line landed in the cache.
    LineReady(usize),
    StylesChanged(Vec<StyleId>),
    DocumentSize(Size),
    ScrollTo { line: usize, col: usize },
    ClipboardWrite(String),
    /// Deliver the event to the normal input path. Happens at most once per event.
    Replay { id: EventId, event: InputEvent },
    /// Engine notification the bridge does not interpret.
    Rpc { method: String, params: Value },
    /// The session hit a fatal error and no longer accepts work.
    SessionAborted(String),
}

pub type FrontendEvents = mpsc::UnboundedReceiver<FrontendEvent>;
