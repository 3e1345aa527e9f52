//! Per-event disposition state machine.
//!
//! ```text
//! submit ──► Awaiting ──handled──► dropped
//!               │ ────rejected──► replayed once
//!               └────delay(ms)──► Delayed ──expiry / new input──► replayed + clear_pending
//!                                    └──────cancel(id)──────────► dropped, no replay
//! ```
//!
//! Replay order always equals submission order: before new input is forwarded, and before a
//! rejected or expired event is replayed, every delayed event scheduled ahead of it is flushed.
//! The scheduler performs no I/O. Each call returns the [`Effect`]s its owner must carry out, in
//! order.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::time::Duration;

use core_events::{
    CANCEL_NOOPS, Disposition, EVENTS_DELAYED, EVENTS_DROPPED, EVENTS_REPLAYED, EVENTS_SUBMITTED,
    EventId, InputEvent, TIMERS_CANCELLED,
};
use tracing::{debug, trace};

use crate::TimerDriver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send the event to the engine for a verdict.
    Forward { id: EventId, event: InputEvent },
    /// Deliver the event to the normal (non-intercepted) input path.
    Replay { id: EventId, event: InputEvent },
    /// Tell the engine the id is no longer pending.
    ClearPending { id: EventId },
}

struct Delayed {
    id: EventId,
    event: InputEvent,
}

pub struct EventScheduler {
    timers: Box<dyn TimerDriver>,
    intercepting: bool,
    next_id: EventId,
    awaiting: HashMap<EventId, InputEvent>,
    /// Schedule order.
    delayed: VecDeque<Delayed>,
}

impl EventScheduler {
    pub fn new(timers: impl TimerDriver + 'static) -> Self {
        Self {
            timers: Box::new(timers),
            intercepting: false,
            next_id: 0,
            awaiting: HashMap::new(),
            delayed: VecDeque::new(),
        }
    }

    /// Route subsequent input through the engine. Without this every event is replayed directly.
    pub fn set_intercepting(&mut self, on: bool) {
        self.intercepting = on;
    }

    pub fn is_intercepting(&self) -> bool {
        self.intercepting
    }

    /// Accept new input. Delayed events are flushed first.
    pub fn submit(&mut self, event: InputEvent) -> Vec<Effect> {
        let mut effects = self.flush_delayed();
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        EVENTS_SUBMITTED.fetch_add(1, Ordering::Relaxed);
        if self.intercepting {
            trace!(
                target: "input.scheduler",
                id,
                key = event.token.log_kind(),
                mods = event.modifiers.canonical_str(),
                "event_forwarded"
            );
            self.awaiting.insert(id, event.clone());
            effects.push(Effect::Forward { id, event });
        } else {
            EVENTS_REPLAYED.fetch_add(1, Ordering::Relaxed);
            effects.push(Effect::Replay { id, event });
        }
        effects
    }

    /// Apply the engine's verdict for an awaiting event. Unknown ids are ignored.
    pub fn resolve(&mut self, id: EventId, disposition: Disposition) -> Vec<Effect> {
        let Some(event) = self.awaiting.remove(&id) else {
            debug!(target: "input.scheduler", id, disposition = disposition.as_str(), "resolve_unknown_id");
            return Vec::new();
        };
        trace!(target: "input.scheduler", id, disposition = disposition.as_str(), "event_resolved");
        match disposition {
            Disposition::Handled => {
                EVENTS_DROPPED.fetch_add(1, Ordering::Relaxed);
                Vec::new()
            }
            Disposition::Rejected => {
                let mut effects = self.flush_scheduled_before(id);
                EVENTS_REPLAYED.fetch_add(1, Ordering::Relaxed);
                effects.push(Effect::Replay { id, event });
                effects
            }
            Disposition::Delay(delay) => {
                self.arm(id, event, delay);
                Vec::new()
            }
        }
    }

    /// A delay elapsed. The event, and every delayed event scheduled before it, is replayed.
    /// Expiry of an id that was already flushed or cancelled is a no-op.
    pub fn timer_fired(&mut self, id: EventId) -> Vec<Effect> {
        let Some(pos) = self.delayed.iter().position(|d| d.id == id) else {
            trace!(target: "input.scheduler", id, "timer_fired_not_pending");
            return Vec::new();
        };
        let mut effects = Vec::new();
        for delayed in self.delayed.drain(..=pos).collect::<Vec<_>>() {
            self.replay_delayed(delayed, &mut effects);
        }
        effects
    }

    /// Discard a delayed event without replay. Returns false (and does nothing) when the id is not
    /// currently delayed.
    pub fn cancel(&mut self, id: EventId) -> bool {
        let Some(pos) = self.delayed.iter().position(|d| d.id == id) else {
            CANCEL_NOOPS.fetch_add(1, Ordering::Relaxed);
            debug!(target: "input.scheduler", id, "cancel_not_pending");
            return false;
        };
        self.delayed.remove(pos);
        self.timers.cancel(id);
        TIMERS_CANCELLED.fetch_add(1, Ordering::Relaxed);
        EVENTS_DROPPED.fetch_add(1, Ordering::Relaxed);
        debug!(target: "input.scheduler", id, "delayed_event_cancelled");
        true
    }

    /// Replay every delayed event, in schedule order.
    pub fn flush_delayed(&mut self) -> Vec<Effect> {
        let mut effects = Vec::with_capacity(self.delayed.len() * 2);
        while let Some(delayed) = self.delayed.pop_front() {
            self.replay_delayed(delayed, &mut effects);
        }
        effects
    }

    /// Cancel all timers and forget every pending event. Returns how many were dropped.
    pub fn shutdown(&mut self) -> usize {
        let dropped = self.awaiting.len() + self.delayed.len();
        for delayed in self.delayed.drain(..) {
            self.timers.cancel(delayed.id);
        }
        self.awaiting.clear();
        EVENTS_DROPPED.fetch_add(dropped as u64, Ordering::Relaxed);
        debug!(target: "input.scheduler", dropped, "scheduler_shutdown");
        dropped
    }

    pub fn awaiting_len(&self) -> usize {
        self.awaiting.len()
    }

    /// Delayed ids in schedule order.
    pub fn delayed_ids(&self) -> Vec<EventId> {
        self.delayed.iter().map(|d| d.id).collect()
    }

    fn arm(&mut self, id: EventId, event: InputEvent, delay: Duration) {
        EVENTS_DELAYED.fetch_add(1, Ordering::Relaxed);
        debug!(target: "input.scheduler", id, delay_ms = delay.as_millis() as u64, "event_delayed");
        self.timers.arm(id, delay);
        self.delayed.push_back(Delayed { id, event });
    }

    fn flush_scheduled_before(&mut self, id: EventId) -> Vec<Effect> {
        let mut effects = Vec::new();
        while self.delayed.front().is_some_and(|d| d.id < id) {
            if let Some(delayed) = self.delayed.pop_front() {
                self.replay_delayed(delayed, &mut effects);
            }
        }
        effects
    }

    fn replay_delayed(&mut self, delayed: Delayed, effects: &mut Vec<Effect>) {
        self.timers.cancel(delayed.id);
        EVENTS_REPLAYED.fetch_add(1, Ordering::Relaxed);
        trace!(target: "input.scheduler", id = delayed.id, "delayed_event_replayed");
        effects.push(Effect::Replay {
            id: delayed.id,
            event: delayed.event,
        });
        effects.push(Effect::ClearPending { id: delayed.id });
    }
}
