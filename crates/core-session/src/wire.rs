//! Parameter shapes of the engine protocol.

use std::time::Duration;

use core_events::{Disposition, EventId};
use core_view::{Style, StyleId};
use serde::{Deserialize, Serialize};

pub(crate) const INSERT: &str = "insert";
pub(crate) const GESTURE: &str = "gesture";
pub(crate) const VIEWPORT_CHANGE: &str = "viewport_change";
pub(crate) const UPDATE_CONFIG: &str = "update_config";
pub(crate) const KEY_EVENT: &str = "key_event";
pub(crate) const CLEAR_PENDING: &str = "clear_pending";
pub(crate) const ENABLE_INPUT_INTERCEPTION: &str = "enable_input_interception";
pub(crate) const GET_LINE: &str = "get_line";
pub(crate) const GET_DOCUMENT: &str = "get_document";

pub(crate) const INVALIDATE: &str = "invalidate";
pub(crate) const NEW_STYLES: &str = "new_styles";
pub(crate) const CONTENT_SIZE: &str = "content_size";
pub(crate) const SCROLL_TO: &str = "scroll_to";
pub(crate) const SET_PASTEBOARD: &str = "set_pasteboard";
pub(crate) const INPUT_DISPOSITION: &str = "input_disposition";
pub(crate) const CANCEL_TIMER: &str = "cancel_timer";
pub(crate) const MEASURE_WIDTH: &str = "measure_width";

/// JSON-RPC "method not found".
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Deserialize)]
pub(crate) struct InvalidateParams {
    pub start: usize,
    #[serde(default)]
    pub end: Option<usize>,
    #[serde(default)]
    pub total_lines: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewStylesParams {
    pub styles: Vec<(StyleId, Style)>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentSizeParams {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScrollToParams {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PasteboardParams {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdParams {
    pub id: EventId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DispositionParams {
    pub id: EventId,
    pub disposition: DispositionWire,
}

/// `"handled"`, `"rejected"` or `{"delay": ms}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum DispositionWire {
    Verdict(Verdict),
    Delay { delay: u64 },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Verdict {
    Handled,
    Rejected,
}

impl From<DispositionWire> for Disposition {
    fn from(wire: DispositionWire) -> Self {
        match wire {
            DispositionWire::Verdict(Verdict::Handled) => Disposition::Handled,
            DispositionWire::Verdict(Verdict::Rejected) => Disposition::Rejected,
            DispositionWire::Delay { delay } => Disposition::Delay(Duration::from_millis(delay)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MeasureParams {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct KeyEventParams<'a> {
    pub id: EventId,
    pub characters: &'a str,
    pub modifiers: u32,
}
