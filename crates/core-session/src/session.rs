//! The session: one engine link, one line cache, one style map, one event scheduler.
//!
//! All state is owned here and mutated only from `&mut self`. Callbacks arriving from other
//! tasks or threads are posted through a [`SessionHandle`] and applied, in arrival order, when
//! the session drains its inbox ([`Session::poll_inbox`], [`Session::process_next`], or while an
//! awaited fetch is pending).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use core_config::EditorConfig;
use core_events::{InputEvent, PROTOCOL_VIOLATIONS};
use core_input::{Effect, EventScheduler, TimerDriver, TokioTimerDriver};
use core_rpc::{
    IdGen, Map, Message, Notification, ProtocolViolation, Request, RequestId, Response, RpcError,
    Value, decode, encode, parse_params,
};
use core_text::{Size, TextMeasure, WidthCache};
use core_view::{FetchOutcome, Line, LineCache, LineRange, ResolvedSpan, Style, StyleId, StyleMap};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::handle::Inbound;
use crate::link::EngineLink;
use crate::wire::{self, DispositionParams, KeyEventParams};
use crate::{BridgeError, FrontendEvent, FrontendEvents, Rect, SessionHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Line(usize),
    Document,
}

/// Result of a line request nobody has collected yet.
#[derive(Debug)]
enum LineOutcome {
    /// The engine has no such line.
    Absent,
    Failed(RpcError),
}

#[derive(Debug, Clone, PartialEq)]
enum State {
    Open,
    Aborted(String),
    Closed,
}

/// A cached line together with its resolved style spans.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledLine {
    pub line: Line,
    pub spans: Vec<ResolvedSpan>,
}

pub struct Session {
    link: Option<Box<dyn EngineLink>>,
    inbox: mpsc::UnboundedReceiver<Inbound>,
    handle: SessionHandle,
    frontend: mpsc::UnboundedSender<FrontendEvent>,
    cache: LineCache,
    styles: StyleMap,
    scheduler: EventScheduler,
    widths: WidthCache,
    config: EditorConfig,
    frame: Option<Rect>,
    ids: IdGen,
    pending: HashMap<RequestId, Pending>,
    line_outcomes: HashMap<usize, LineOutcome>,
    documents: HashMap<RequestId, Result<String, RpcError>>,
    interception_registered: bool,
    state: State,
}

impl Session {
    /// Start a session whose delayed input is timed on the Tokio runtime. Must be called inside a
    /// runtime.
    pub fn new(
        link: impl EngineLink + 'static,
        measure: impl TextMeasure + 'static,
        config: EditorConfig,
    ) -> Result<(Self, FrontendEvents), BridgeError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let expiry_handle = SessionHandle::new(tx.clone());
        let timers = TokioTimerDriver::new(Arc::new(move |id| {
            expiry_handle.timer_fired(id);
        }));
        Self::start(link, measure, config, timers, tx, rx)
    }

    /// Start a session with a caller-supplied timer driver. Expiry must be reported through
    /// [`SessionHandle::timer_fired`].
    pub fn with_timer_driver(
        link: impl EngineLink + 'static,
        measure: impl TextMeasure + 'static,
        config: EditorConfig,
        timers: impl TimerDriver + 'static,
    ) -> Result<(Self, FrontendEvents), BridgeError> {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::start(link, measure, config, timers, tx, rx)
    }

    fn start(
        link: impl EngineLink + 'static,
        measure: impl TextMeasure + 'static,
        config: EditorConfig,
        timers: impl TimerDriver + 'static,
        tx: mpsc::UnboundedSender<Inbound>,
        rx: mpsc::UnboundedReceiver<Inbound>,
    ) -> Result<(Self, FrontendEvents), BridgeError> {
        let handle = SessionHandle::new(tx);
        let mut link: Box<dyn EngineLink> = Box::new(link);
        link.start(handle.clone())
            .map_err(|e| BridgeError::Link(format!("{e:#}")))?;
        let (frontend, events) = mpsc::unbounded_channel();
        info!(target: "session", "session_started");
        let session = Self {
            link: Some(link),
            inbox: rx,
            handle,
            frontend,
            cache: LineCache::new(),
            styles: StyleMap::new(),
            scheduler: EventScheduler::new(timers),
            widths: WidthCache::new(measure),
            config,
            frame: None,
            ids: IdGen::new(),
            pending: HashMap::new(),
            line_outcomes: HashMap::new(),
            documents: HashMap::new(),
            interception_registered: false,
            state: State::Open,
        };
        Ok((session, events))
    }

    /// Handle for posting engine frames and UI intents from other tasks or threads.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    // ----- user intents ---------------------------------------------------------------------

    pub fn insert_text(&mut self, text: &str) -> Result<(), BridgeError> {
        debug!(target: "session", len = text.len(), "insert_text");
        self.notify(wire::INSERT, json!({ "chars": text }))
    }

    /// Forward an editing command by name. The bridge does not interpret it.
    pub fn do_command(&mut self, name: &str) -> Result<(), BridgeError> {
        debug!(target: "session", command = name, "do_command");
        self.notify(name, json!({}))
    }

    pub fn do_gesture(&mut self, line: usize, col: usize, ty: &str) -> Result<(), BridgeError> {
        trace!(target: "session", line, col, ty, "do_gesture");
        self.notify(wire::GESTURE, json!({ "line": line, "col": col, "ty": ty }))
    }

    /// Push option changes to the engine. Mistyped values for known options are dropped, and
    /// nothing is sent when no change is left. Font changes also drop memoized text measurements.
    pub fn update_config(&mut self, changes: Map<String, Value>) -> Result<(), BridgeError> {
        self.ensure_open()?;
        let changes = self.config.apply(&changes);
        if changes.is_empty() {
            return Ok(());
        }
        if EditorConfig::touches_font(&changes) {
            self.widths.clear();
        }
        let keys: Vec<&str> = changes.keys().map(String::as_str).collect();
        debug!(target: "session", keys = ?keys, "update_config");
        self.notify(wire::UPDATE_CONFIG, json!({ "changes": changes }))
    }

    /// Send only the options that differ from the current ones.
    pub fn set_editor_config(&mut self, next: EditorConfig) -> Result<(), BridgeError> {
        let changes = next.diff(&self.config);
        self.update_config(changes)
    }

    /// Send every option, as done once after the engine starts.
    pub fn sync_config(&mut self) -> Result<(), BridgeError> {
        let all = self.config.to_params();
        self.notify(wire::UPDATE_CONFIG, json!({ "changes": all }))
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Report the visible viewport. An unchanged rect is not re-sent.
    pub fn frame_changed(&mut self, rect: Rect) -> Result<(), BridgeError> {
        self.ensure_open()?;
        if self.frame == Some(rect) {
            trace!(target: "session", "frame_unchanged");
            return Ok(());
        }
        self.frame = Some(rect);
        self.notify(
            wire::VIEWPORT_CHANGE,
            json!({ "x": rect.x, "y": rect.y, "width": rect.width, "height": rect.height }),
        )
    }

    // ----- input ----------------------------------------------------------------------------

    /// Route all further input through the engine.
    ///
    /// # Panics
    /// When called a second time on the same session.
    pub fn enable_input_interception(&mut self) -> Result<(), BridgeError> {
        assert!(
            !self.interception_registered,
            "input interception registered twice on one session"
        );
        self.ensure_open()?;
        self.interception_registered = true;
        self.scheduler.set_intercepting(true);
        info!(target: "session", "input_interception_enabled");
        self.notify(wire::ENABLE_INPUT_INTERCEPTION, json!({}))
    }

    /// Submit a keystroke. Delayed events are flushed first; replays surface as
    /// [`FrontendEvent::Replay`].
    pub fn submit_key(&mut self, event: InputEvent) -> Result<(), BridgeError> {
        self.ensure_open()?;
        let effects = self.scheduler.submit(event);
        self.apply_effects(effects)
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) -> Result<(), BridgeError> {
        for effect in effects {
            match effect {
                Effect::Forward { id, event } => {
                    let characters = event.token.wire_name();
                    let params = KeyEventParams {
                        id,
                        characters: &characters,
                        modifiers: event.modifiers.bits(),
                    };
                    let params = serde_json::to_value(params)
                        .map_err(|e| BridgeError::Link(format!("encode key_event: {e}")))?;
                    self.notify(wire::KEY_EVENT, params)?;
                }
                Effect::Replay { id, event } => self.emit(FrontendEvent::Replay { id, event }),
                Effect::ClearPending { id } => {
                    self.notify(wire::CLEAR_PENDING, json!({ "id": id }))?;
                }
            }
        }
        Ok(())
    }

    // ----- view model -----------------------------------------------------------------------

    /// Cached line, if any. Never triggers a fetch.
    pub fn line(&self, index: usize) -> Option<&Line> {
        self.cache.get(index)
    }

    /// The cached line, or the paint-only placeholder while a fetch is issued.
    pub fn line_or_placeholder(&mut self, index: usize) -> Result<&Line, BridgeError> {
        self.poll_inbox()?;
        if self.cache.needs_fetch(index) {
            self.line_outcomes.remove(&index);
            self.request_line(index)?;
        }
        Ok(self.cache.get_or_placeholder(index))
    }

    /// Line `index` as the engine currently has it. `None` when the engine has no such line.
    ///
    /// Queued callbacks are applied before the cache is consulted, and the inbox keeps draining in
    /// order while waiting, so a reply that raced an invalidation is re-requested.
    pub async fn fetch_line(&mut self, index: usize) -> Result<Option<Line>, BridgeError> {
        // Outcomes left over from earlier drains belong to nobody; replies already queued count.
        self.line_outcomes.remove(&index);
        self.poll_inbox()?;
        if let Some(line) = self.cache.get(index) {
            return Ok(Some(line.clone()));
        }
        match self.line_outcomes.remove(&index) {
            Some(LineOutcome::Absent) => return Ok(None),
            Some(LineOutcome::Failed(e)) => return Err(BridgeError::Rpc(e)),
            None => {}
        }
        if !self.cache.is_in_flight(index) {
            if !self.cache.needs_fetch(index) {
                return Ok(None);
            }
            self.request_line(index)?;
        }
        loop {
            self.process_next().await?;
            if let Some(line) = self.cache.get(index) {
                return Ok(Some(line.clone()));
            }
            match self.line_outcomes.remove(&index) {
                Some(LineOutcome::Absent) => return Ok(None),
                Some(LineOutcome::Failed(e)) => return Err(BridgeError::Rpc(e)),
                None => {}
            }
            if !self.cache.is_in_flight(index) {
                // Stored and then invalidated before we looked.
                if !self.cache.needs_fetch(index) {
                    return Ok(None);
                }
                self.request_line(index)?;
            }
        }
    }

    /// Full document text.
    pub async fn fetch_document(&mut self) -> Result<String, BridgeError> {
        self.ensure_open()?;
        let id = self.request(wire::GET_DOCUMENT, json!({}), Pending::Document)?;
        loop {
            self.process_next().await?;
            if let Some(outcome) = self.documents.remove(&id) {
                return outcome.map_err(BridgeError::Rpc);
            }
        }
    }

    /// Resolve the style spans of cached line `index`. A span naming an undefined style aborts
    /// the session.
    pub fn styled_line(&mut self, index: usize) -> Result<Option<StyledLine>, BridgeError> {
        self.ensure_open()?;
        let Some(line) = self.cache.get(index) else {
            return Ok(None);
        };
        match self.styles.resolve(line) {
            Ok(spans) => Ok(Some(StyledLine {
                line: line.clone(),
                spans,
            })),
            Err(e) => {
                self.abort(e.to_string());
                Err(BridgeError::View(e))
            }
        }
    }

    /// Lookup a defined style. Undefined ids are a contract violation but leave the session
    /// running, since nothing was rendered.
    pub fn style(&self, id: StyleId) -> Result<&Style, BridgeError> {
        self.styles.style(id).map_err(BridgeError::from)
    }

    pub fn styles(&self) -> &StyleMap {
        &self.styles
    }

    pub fn cache(&self) -> &LineCache {
        &self.cache
    }

    pub fn total_lines(&self) -> Option<usize> {
        self.cache.total_lines()
    }

    pub fn document_size(&self) -> Size {
        self.cache.document_size()
    }

    // ----- inbox ----------------------------------------------------------------------------

    /// Apply everything already queued without waiting. Returns how many items were handled.
    pub fn poll_inbox(&mut self) -> Result<usize, BridgeError> {
        self.ensure_open()?;
        let mut handled = 0;
        while let Ok(item) = self.inbox.try_recv() {
            self.handle_inbound(item)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Wait for one queued item and apply it.
    pub async fn process_next(&mut self) -> Result<(), BridgeError> {
        self.ensure_open()?;
        // The session holds a sender itself, so the inbox never reports closed.
        let item = self.inbox.recv().await.ok_or(BridgeError::SessionClosed)?;
        self.handle_inbound(item)
    }

    fn handle_inbound(&mut self, item: Inbound) -> Result<(), BridgeError> {
        match item {
            Inbound::Frame(frame) => match decode(&frame) {
                Ok(message) => self.handle_message(message),
                Err(violation) => Err(self.violation(violation)),
            },
            Inbound::TimerFired(id) => {
                let effects = self.scheduler.timer_fired(id);
                self.apply_effects(effects)
            }
            Inbound::Insert(text) => self.insert_text(&text),
            Inbound::Command(name) => self.do_command(&name),
            Inbound::UpdateConfig(changes) => self.update_config(changes),
            Inbound::LinkClosed(reason) => {
                let reason = reason.unwrap_or_else(|| "engine closed the link".to_string());
                warn!(target: "session", reason = %reason, "engine_link_closed");
                self.abort(reason.clone());
                Err(BridgeError::SessionAborted(reason))
            }
        }
    }

    fn handle_message(&mut self, message: Message) -> Result<(), BridgeError> {
        match message {
            Message::Notification(n) => self.handle_notification(n),
            Message::Request(r) => self.handle_request(r),
            Message::Response(r) => self.handle_response(r),
        }
    }

    fn handle_notification(&mut self, n: Notification) -> Result<(), BridgeError> {
        let method = n.method.as_str();
        match method {
            wire::INVALIDATE => {
                let p: wire::InvalidateParams = self.params(method, &n.params)?;
                if let Some(total) = p.total_lines {
                    self.cache.set_total_lines(total);
                }
                let range = LineRange {
                    start: p.start,
                    end: p.end,
                };
                self.cache.invalidate(range);
                self.line_outcomes.retain(|i, _| !range.contains(*i));
                self.emit(FrontendEvent::LinesInvalidated(range));
            }
            wire::NEW_STYLES => {
                let p: wire::NewStylesParams = self.params(method, &n.params)?;
                let ids: Vec<StyleId> = p.styles.iter().map(|(id, _)| *id).collect();
                debug!(target: "session", count = ids.len(), "styles_defined");
                self.styles.define_all(p.styles);
                self.emit(FrontendEvent::StylesChanged(ids));
            }
            wire::CONTENT_SIZE => {
                let p: wire::ContentSizeParams = self.params(method, &n.params)?;
                let size = Size {
                    width: p.width,
                    height: p.height,
                };
                self.cache.set_document_size(size);
                self.emit(FrontendEvent::DocumentSize(size));
            }
            wire::SCROLL_TO => {
                let p: wire::ScrollToParams = self.params(method, &n.params)?;
                self.emit(FrontendEvent::ScrollTo {
                    line: p.line,
                    col: p.col,
                });
            }
            wire::SET_PASTEBOARD => {
                let p: wire::PasteboardParams = self.params(method, &n.params)?;
                debug!(target: "session", len = p.text.len(), "clipboard_write");
                self.emit(FrontendEvent::ClipboardWrite(p.text));
            }
            wire::INPUT_DISPOSITION => {
                let p: DispositionParams = self.params(method, &n.params)?;
                let effects = self.scheduler.resolve(p.id, p.disposition.into());
                self.apply_effects(effects)?;
            }
            wire::CANCEL_TIMER => {
                let p: wire::IdParams = self.params(method, &n.params)?;
                self.scheduler.cancel(p.id);
            }
            _ => {
                trace!(target: "session", method, "rpc_forwarded");
                self.emit(FrontendEvent::Rpc {
                    method: n.method,
                    params: n.params,
                });
            }
        }
        Ok(())
    }

    fn handle_request(&mut self, r: Request) -> Result<(), BridgeError> {
        let response = match r.method.as_str() {
            wire::MEASURE_WIDTH => {
                let p: wire::MeasureParams = self.params(&r.method, &r.params)?;
                let size = self.widths.measure(&p.text);
                Response::ok(r.id, json!({ "width": size.width, "height": size.height }))
            }
            other => {
                warn!(target: "session", method = other, "unknown_engine_request");
                Response::err(
                    r.id,
                    RpcError::new(format!("unknown method `{other}`"), wire::METHOD_NOT_FOUND),
                )
            }
        };
        self.send(Message::Response(response))
    }

    fn handle_response(&mut self, r: Response) -> Result<(), BridgeError> {
        let Some(pending) = self.pending.remove(&r.id) else {
            return Err(self.violation(ProtocolViolation::UnknownResponse(r.id)));
        };
        match (pending, r.outcome) {
            (Pending::Line(index), Ok(Value::Null)) => {
                self.cache.abort_fetch(index);
                self.line_outcomes.insert(index, LineOutcome::Absent);
            }
            (Pending::Line(index), Ok(value)) => {
                let line: Line = self.params(wire::GET_LINE, &value)?;
                match self.cache.complete_fetch(index, line) {
                    FetchOutcome::Stale => {
                        if self.cache.needs_fetch(index) {
                            self.request_line(index)?;
                        }
                    }
                    FetchOutcome::Stored | FetchOutcome::Unsolicited => {
                        self.emit(FrontendEvent::LineReady(index));
                    }
                }
            }
            (Pending::Line(index), Err(e)) => {
                debug!(target: "session", line = index, code = e.code, "line_fetch_failed");
                self.cache.abort_fetch(index);
                self.line_outcomes.insert(index, LineOutcome::Failed(e));
            }
            (Pending::Document, Ok(Value::String(text))) => {
                debug!(target: "session", len = text.len(), "document_fetched");
                self.documents.insert(r.id, Ok(text));
            }
            (Pending::Document, Ok(_)) => {
                return Err(self.violation(ProtocolViolation::InvalidParams {
                    method: wire::GET_DOCUMENT.to_string(),
                    reason: "result is not a string".to_string(),
                }));
            }
            (Pending::Document, Err(e)) => {
                self.documents.insert(r.id, Err(e));
            }
        }
        Ok(())
    }

    fn params<T: serde::de::DeserializeOwned>(
        &mut self,
        method: &str,
        params: &Value,
    ) -> Result<T, BridgeError> {
        parse_params(method, params).map_err(|v| self.violation(v))
    }

    // ----- outbound -------------------------------------------------------------------------

    fn request_line(&mut self, index: usize) -> Result<(), BridgeError> {
        if !self.cache.begin_fetch(index) {
            return Ok(());
        }
        if let Err(e) = self.request(wire::GET_LINE, json!({ "line": index }), Pending::Line(index)) {
            self.cache.abort_fetch(index);
            return Err(e);
        }
        Ok(())
    }

    fn request(
        &mut self,
        method: &str,
        params: Value,
        pending: Pending,
    ) -> Result<RequestId, BridgeError> {
        let id = self.ids.next();
        self.send(Message::Request(Request::new(id, method, params)))?;
        self.pending.insert(id, pending);
        Ok(id)
    }

    fn notify(&mut self, method: &str, params: Value) -> Result<(), BridgeError> {
        self.send(Message::Notification(Notification::new(method, params)))
    }

    fn send(&mut self, message: Message) -> Result<(), BridgeError> {
        self.ensure_open()?;
        let frame = encode(&message);
        let link = self.link.as_mut().ok_or(BridgeError::SessionClosed)?;
        trace!(target: "session.link", method = message.method(), len = frame.len(), "frame_sent");
        link.send(frame).map_err(|e| BridgeError::Link(format!("{e:#}")))
    }

    fn emit(&self, event: FrontendEvent) {
        // The UI may have stopped listening; the session keeps working regardless.
        let _ = self.frontend.send(event);
    }

    // ----- lifecycle ------------------------------------------------------------------------

    fn ensure_open(&self) -> Result<(), BridgeError> {
        match &self.state {
            State::Open => Ok(()),
            State::Aborted(reason) => Err(BridgeError::SessionAborted(reason.clone())),
            State::Closed => Err(BridgeError::SessionClosed),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == State::Open
    }

    fn violation(&mut self, violation: ProtocolViolation) -> BridgeError {
        PROTOCOL_VIOLATIONS.fetch_add(1, Ordering::Relaxed);
        self.abort(violation.to_string());
        BridgeError::Protocol(violation)
    }

    /// Fatal error: stop accepting work and release the engine.
    fn abort(&mut self, reason: String) {
        if self.state != State::Open {
            return;
        }
        error!(target: "session", reason = %reason, "session_aborted");
        self.teardown();
        self.state = State::Aborted(reason.clone());
        self.emit(FrontendEvent::SessionAborted(reason));
    }

    /// Close the link, cancel every armed timer and forget outstanding requests. Idempotent.
    pub fn shutdown(&mut self) {
        if self.state != State::Open {
            return;
        }
        self.teardown();
        self.state = State::Closed;
        info!(target: "session", "session_closed");
    }

    fn teardown(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        let dropped_events = self.scheduler.shutdown();
        let dropped_requests = self.pending.len();
        for (_, pending) in self.pending.drain() {
            if let Pending::Line(index) = pending {
                self.cache.abort_fetch(index);
            }
        }
        self.documents.clear();
        self.line_outcomes.clear();
        debug!(target: "session", dropped_events, dropped_requests, "session_teardown");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("cached_lines", &self.cache.cached_len())
            .field("styles", &self.styles.len())
            .field("pending_requests", &self.pending.len())
            .field("intercepting", &self.scheduler.is_intercepting())
            .finish()
    }
}
