//! Input interception: the engine may consume, reject, or delay each keystroke.

mod scheduler;
mod timer;

pub use scheduler::{Effect, EventScheduler};
pub use timer::{
    ExpiryFn, RecordedTimers, RecordingTimerDriver, TimerDriver, TimerLog, TokioTimerDriver,
};

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::{InputEvent, KeyToken, Modifiers};
    use std::fmt;
    use std::sync::{Arc, Mutex};
    use tracing::Subscriber;
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::registry::Registry;

    #[derive(Clone, Default)]
    struct Capture {
        events: Arc<Mutex<Vec<(String, Vec<(String, String)>)>>>,
    }

    #[derive(Default)]
    struct FieldCollector {
        fields: Vec<(String, String)>,
    }

    impl Visit for FieldCollector {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.fields.push((field.name().to_string(), format!("{:?}", value)));
        }
    }

    impl<S: Subscriber> Layer<S> for Capture {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let mut collector = FieldCollector::default();
            event.record(&mut collector);
            self.events
                .lock()
                .unwrap()
                .push((event.metadata().target().to_string(), collector.fields));
        }
    }

    #[test]
    fn forwarded_key_log_redacts_characters() {
        let capture = Capture::default();
        let events = capture.events.clone();
        let dispatch = tracing::Dispatch::new(Registry::default().with(capture));

        tracing::dispatcher::with_default(&dispatch, || {
            let (driver, _) = RecordingTimerDriver::new();
            let mut scheduler = EventScheduler::new(driver);
            scheduler.set_intercepting(true);
            scheduler.submit(InputEvent::new(
                KeyToken::Chars("hunter2".into()),
                Modifiers::COMMAND,
            ));
        });

        let events = events.lock().unwrap();
        let (_, fields) = events
            .iter()
            .find(|(target, _)| target == "input.scheduler")
            .expect("missing input.scheduler event");
        assert!(fields.iter().any(|(name, value)| name == "key" && value.contains("chars")));
        assert!(fields.iter().any(|(name, value)| name == "mods" && value.contains("cmd")));
        for (_, value) in fields {
            assert!(!value.contains("hunter2"), "log leaked key characters: {value}");
        }
    }
}
