//! Capture `tracing` output in unit tests.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::{
    Event,
    Level,
    Metadata,
    Subscriber,
    field::{Field, Visit},
    span::{Attributes, Id, Record},
};

/// A span or event seen by [`capture`].
#[derive(Debug)]
pub(crate) struct Recorded {
    kind: RecordedKind,
    name: &'static str,
    level: Level,
    fields: HashMap<String, String>,
    message: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RecordedKind {
    Span,
    Event,
}

impl Recorded {
    pub(crate) const fn level(&self) -> Level { self.level }

    pub(crate) const fn name(&self) -> &'static str { self.name }

    pub(crate) fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub(crate) fn message(&self) -> Option<&str> { self.message.as_deref() }
}

/// Everything emitted while `f` ran, in order.
pub(crate) struct Captured {
    records: Vec<Recorded>,
}

impl Captured {
    pub(crate) fn spans(&self) -> impl Iterator<Item = &Recorded> {
        self.records.iter().filter(|r| r.kind == RecordedKind::Span)
    }

    pub(crate) fn events(&self) -> impl Iterator<Item = &Recorded> {
        self.records.iter().filter(|r| r.kind == RecordedKind::Event)
    }

    pub(crate) fn event_with_message(&self, message: &str) -> Option<&Recorded> {
        self.events().find(|e| e.message() == Some(message))
    }
}

#[derive(Clone, Default)]
struct RecordingSubscriber {
    records: Arc<Mutex<Vec<Recorded>>>,
    next_span: Arc<AtomicU64>,
}

impl RecordingSubscriber {
    fn records(&self) -> MutexGuard<'_, Vec<Recorded>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn push(&self, kind: RecordedKind, metadata: &Metadata<'_>, recorder: FieldRecorder) {
        self.records().push(Recorded {
            kind,
            name: metadata.name(),
            level: *metadata.level(),
            fields: recorder.fields,
            message: recorder.message,
        });
    }
}

#[derive(Default)]
struct FieldRecorder {
    fields: HashMap<String, String>,
    message: Option<String>,
}

impl FieldRecorder {
    fn record_value(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_owned(), value);
        }
    }
}

impl Visit for FieldRecorder {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field, format!("{value:?}"));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, value.to_owned());
    }
}

impl Subscriber for RecordingSubscriber {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool { true }

    fn new_span(&self, attrs: &Attributes<'_>) -> Id {
        let mut recorder = FieldRecorder::default();
        attrs.record(&mut recorder);
        self.push(RecordedKind::Span, attrs.metadata(), recorder);
        Id::from_u64(self.next_span.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let mut recorder = FieldRecorder::default();
        event.record(&mut recorder);
        self.push(RecordedKind::Event, event.metadata(), recorder);
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Run `f` with a recording subscriber as the thread's default.
pub(crate) fn capture<R>(f: impl FnOnce() -> R) -> (R, Captured) {
    let subscriber = RecordingSubscriber::default();
    let dispatch = tracing::Dispatch::new(subscriber.clone());
    let result = tracing::dispatcher::with_default(&dispatch, f);
    let records = std::mem::take(&mut *subscriber.records());
    (result, Captured { records })
}
