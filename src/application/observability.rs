//! Observability port consumed by the render pipeline.
//!
//! The registry is created once at process start and injected into the
//! pipeline as an `Arc<dyn Observability>`; nothing here is looked up through
//! globals, so tests can substitute an in-memory recorder.

use std::time::Duration;

use uuid::Uuid;

use super::pipeline::Stage;

/// Process-wide request counters. They only ever increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestCounter {
    Attempted,
    Succeeded,
    Failed,
}

impl RequestCounter {
    pub const ALL: [RequestCounter; 3] = [
        RequestCounter::Attempted,
        RequestCounter::Succeeded,
        RequestCounter::Failed,
    ];

    pub fn metric_name(self) -> &'static str {
        match self {
            RequestCounter::Attempted => "pdf_render_count",
            RequestCounter::Succeeded => "pdf_render_success_count",
            RequestCounter::Failed => "pdf_render_fail_count",
        }
    }
}

/// Histogram recording per-stage latency, labelled by `stage`.
pub const STAGE_DURATION_METRIC: &str = "pdf_render_duration_ms";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    Error(String),
}

/// A span opened for the lifetime of one stage.
pub trait StageSpan: Send {
    fn set_status(&mut self, status: SpanStatus);

    /// The `tracing` span the stage's work is instrumented with.
    fn tracing_span(&self) -> tracing::Span {
        tracing::Span::none()
    }

    fn end(self: Box<Self>);
}

pub trait Observability: Send + Sync {
    fn increment(&self, counter: RequestCounter);

    fn observe_stage(&self, stage: Stage, elapsed: Duration);

    fn start_span(&self, stage: Stage, request_id: Uuid) -> Box<dyn StageSpan>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Default)]
    struct Recorded {
        counters: HashMap<RequestCounter, u64>,
        stages: Vec<Stage>,
        spans: Vec<(Stage, SpanStatus)>,
    }

    /// In-memory registry used by unit tests.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct RecordingObservability {
        inner: Arc<Mutex<Recorded>>,
    }

    impl RecordingObservability {
        pub(crate) fn count(&self, counter: RequestCounter) -> u64 {
            let recorded = self.inner.lock().expect("recorder lock");
            recorded.counters.get(&counter).copied().unwrap_or(0)
        }

        pub(crate) fn stages(&self) -> Vec<Stage> {
            self.inner.lock().expect("recorder lock").stages.clone()
        }

        pub(crate) fn spans(&self) -> Vec<(Stage, SpanStatus)> {
            self.inner.lock().expect("recorder lock").spans.clone()
        }
    }

    struct RecordingSpan {
        stage: Stage,
        status: Option<SpanStatus>,
        inner: Arc<Mutex<Recorded>>,
    }

    impl StageSpan for RecordingSpan {
        fn set_status(&mut self, status: SpanStatus) {
            self.status = Some(status);
        }

        fn end(self: Box<Self>) {
            let status = self.status.unwrap_or(SpanStatus::Ok);
            self.inner
                .lock()
                .expect("recorder lock")
                .spans
                .push((self.stage, status));
        }
    }

    impl Observability for RecordingObservability {
        fn increment(&self, counter: RequestCounter) {
            *self
                .inner
                .lock()
                .expect("recorder lock")
                .counters
                .entry(counter)
                .or_default() += 1;
        }

        fn observe_stage(&self, stage: Stage, _elapsed: Duration) {
            self.inner.lock().expect("recorder lock").stages.push(stage);
        }

        fn start_span(&self, stage: Stage, _request_id: Uuid) -> Box<dyn StageSpan> {
            Box::new(RecordingSpan {
                stage,
                status: None,
                inner: Arc::clone(&self.inner),
            })
        }
    }
}
