//! Timer drivers backing delayed input events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use core_events::EventId;
use tokio::task::AbortHandle;

/// Arms and cancels one-shot timers keyed by event id. Expiry is reported out of band (the
/// driver's owner re-posts it onto the scheduler's context); a driver never calls into the
/// scheduler directly.
pub trait TimerDriver: Send {
    fn arm(&mut self, id: EventId, delay: Duration);
    /// Must be safe for ids that already fired or were never armed.
    fn cancel(&mut self, id: EventId);
}

/// Callback invoked from the timer task when a delay elapses.
pub type ExpiryFn = Arc<dyn Fn(EventId) + Send + Sync>;

/// One Tokio task per armed timer. Must be used from within a Tokio runtime.
pub struct TokioTimerDriver {
    on_expire: ExpiryFn,
    armed: HashMap<EventId, AbortHandle>,
}

impl TokioTimerDriver {
    pub fn new(on_expire: ExpiryFn) -> Self {
        Self {
            on_expire,
            armed: HashMap::new(),
        }
    }

    pub fn armed_len(&self) -> usize {
        self.armed.len()
    }
}

impl TimerDriver for TokioTimerDriver {
    fn arm(&mut self, id: EventId, delay: Duration) {
        let on_expire = self.on_expire.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_expire(id);
        });
        if let Some(previous) = self.armed.insert(id, handle.abort_handle()) {
            previous.abort();
        }
    }

    fn cancel(&mut self, id: EventId) {
        if let Some(handle) = self.armed.remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for TokioTimerDriver {
    fn drop(&mut self) {
        for (_, handle) in self.armed.drain() {
            handle.abort();
        }
    }
}

/// Records arm/cancel calls and fires nothing on its own. The paired [`RecordedTimers`] view lets
/// a test inspect what was armed and decide when "expiry" happens.
#[derive(Default)]
pub struct RecordingTimerDriver {
    log: Arc<Mutex<TimerLog>>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimerLog {
    pub armed: Vec<(EventId, Duration)>,
    pub cancelled: Vec<EventId>,
}

#[derive(Clone, Default)]
pub struct RecordedTimers {
    log: Arc<Mutex<TimerLog>>,
}

impl RecordingTimerDriver {
    pub fn new() -> (Self, RecordedTimers) {
        let log = Arc::new(Mutex::new(TimerLog::default()));
        (Self { log: log.clone() }, RecordedTimers { log })
    }
}

impl RecordedTimers {
    pub fn snapshot(&self) -> TimerLog {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl TimerDriver for RecordingTimerDriver {
    fn arm(&mut self, id: EventId, delay: Duration) {
        if let Ok(mut log) = self.log.lock() {
            log.armed.push((id, delay));
        }
    }

    fn cancel(&mut self, id: EventId) {
        if let Ok(mut log) = self.log.lock() {
            log.cancelled.push(id);
        }
    }
}
