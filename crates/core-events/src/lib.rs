//! Input identity shared by the bridge crates.
//!
//! Every keystroke the front end forwards to the engine is represented as an
//! owned [`InputEvent`] keyed by an [`EventId`]. The engine only ever sees the
//! id plus the normalized key identity; the event value itself stays on the
//! front-end side until it is replayed or dropped.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Session-scoped identifier for an input event. Monotonically increasing;
/// wraparound is not handled.
pub type EventId = u32;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
// Relaxed atomic counters, read through `telemetry_snapshot()`.
// -------------------------------------------------------------------------------------------------
pub static EVENTS_SUBMITTED: AtomicU64 = AtomicU64::new(0);
pub static EVENTS_REPLAYED: AtomicU64 = AtomicU64::new(0);
pub static EVENTS_DROPPED: AtomicU64 = AtomicU64::new(0); // handled by the engine or cancelled
pub static EVENTS_DELAYED: AtomicU64 = AtomicU64::new(0);
pub static TIMERS_CANCELLED: AtomicU64 = AtomicU64::new(0);
pub static CANCEL_NOOPS: AtomicU64 = AtomicU64::new(0); // cancel for an id that was not pending
pub static PROTOCOL_VIOLATIONS: AtomicU64 = AtomicU64::new(0);

/// Point-in-time copy of the telemetry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub submitted: u64,
    pub replayed: u64,
    pub dropped: u64,
    pub delayed: u64,
    pub timers_cancelled: u64,
    pub cancel_noops: u64,
    pub protocol_violations: u64,
}

pub fn telemetry_snapshot() -> TelemetrySnapshot {
    TelemetrySnapshot {
        submitted: EVENTS_SUBMITTED.load(Ordering::Relaxed),
        replayed: EVENTS_REPLAYED.load(Ordering::Relaxed),
        dropped: EVENTS_DROPPED.load(Ordering::Relaxed),
        delayed: EVENTS_DELAYED.load(Ordering::Relaxed),
        timers_cancelled: TIMERS_CANCELLED.load(Ordering::Relaxed),
        cancel_noops: CANCEL_NOOPS.load(Ordering::Relaxed),
        protocol_violations: PROTOCOL_VIOLATIONS.load(Ordering::Relaxed),
    }
}

bitflags::bitflags! {
    /// Modifier word as reported by the host toolkit. Bit positions follow the
    /// AppKit device-independent flags so the raw word can be passed through.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Modifiers: u32 {
        const SHIFT   = 1 << 17;
        const CONTROL = 1 << 18;
        const OPTION  = 1 << 19;
        const COMMAND = 1 << 20;
    }
}

impl Modifiers {
    /// Keep only the bits the bridge understands (caps lock, fn and friends are discarded).
    pub fn from_raw(raw: u32) -> Self {
        Self::from_bits_truncate(raw)
    }

    /// Stable `cmd+opt+ctrl` style rendering for logs.
    /// Shift is folded into the characters and never appears here.
    pub fn canonical_str(self) -> &'static str {
        let cmd = self.contains(Modifiers::COMMAND);
        let opt = self.contains(Modifiers::OPTION);
        let ctrl = self.contains(Modifiers::CONTROL);
        match (cmd, opt, ctrl) {
            (true, true, true) => "cmd+opt+ctrl",
            (true, true, false) => "cmd+opt",
            (true, false, true) => "cmd+ctrl",
            (false, true, true) => "opt+ctrl",
            (true, false, false) => "cmd",
            (false, true, false) => "opt",
            (false, false, true) => "ctrl",
            (false, false, false) => "",
        }
    }
}

/// Non-printable keys the engine recognises by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Escape,
    Backspace,
    Delete,
    Enter,
    LeftArrow,
    RightArrow,
    DownArrow,
    UpArrow,
}

impl NamedKey {
    pub fn wire_name(self) -> &'static str {
        match self {
            NamedKey::Escape => "Escape",
            NamedKey::Backspace => "Backspace",
            NamedKey::Delete => "Delete",
            NamedKey::Enter => "Enter",
            NamedKey::LeftArrow => "LeftArrow",
            NamedKey::RightArrow => "RightArrow",
            NamedKey::DownArrow => "DownArrow",
            NamedKey::UpArrow => "UpArrow",
        }
    }

    /// Fixed virtual key code table. Anything not listed here is treated as printable input.
    pub fn from_virtual_keycode(code: u16) -> Option<Self> {
        let key = match code {
            53 => NamedKey::Escape,
            51 => NamedKey::Backspace,
            117 => NamedKey::Delete,
            76 => NamedKey::Enter,
            123 => NamedKey::LeftArrow,
            124 => NamedKey::RightArrow,
            125 => NamedKey::DownArrow,
            126 => NamedKey::UpArrow,
            _ => return None,
        };
        Some(key)
    }
}

/// Normalized key identity sent to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyToken {
    /// Printable characters exactly as the toolkit produced them (may be more than one scalar).
    Chars(String),
    Named(NamedKey),
}

impl KeyToken {
    /// Normalize a raw platform key event. Named keys win over whatever characters the toolkit
    /// attached (arrow keys carry private-use code points, for instance).
    pub fn from_virtual_keycode(code: u16, characters: &str) -> Self {
        match NamedKey::from_virtual_keycode(code) {
            Some(named) => KeyToken::Named(named),
            None => KeyToken::Chars(characters.to_string()),
        }
    }

    pub fn wire_name(&self) -> Cow<'_, str> {
        match self {
            KeyToken::Chars(s) => Cow::Borrowed(s.as_str()),
            KeyToken::Named(named) => Cow::Borrowed(named.wire_name()),
        }
    }

    /// Discriminant-only label for logging. Printable payloads are never logged.
    pub fn log_kind(&self) -> &'static str {
        match self {
            KeyToken::Chars(_) => "chars",
            KeyToken::Named(named) => named.wire_name(),
        }
    }
}

impl fmt::Display for KeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_name())
    }
}

/// An input event owned by the front end while the engine decides what to do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    pub token: KeyToken,
    pub modifiers: Modifiers,
}

impl InputEvent {
    pub fn new(token: KeyToken, modifiers: Modifiers) -> Self {
        Self { token, modifiers }
    }
}

/// Engine verdict for a submitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Consumed; the event is dropped.
    Handled,
    /// Declined; replay once into the normal input path.
    Rejected,
    /// Hold the event and replay it when the delay elapses unless cancelled first.
    Delay(Duration),
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Handled => "handled",
            Disposition::Rejected => "rejected",
            Disposition::Delay(_) => "delay",
        }
    }
}
