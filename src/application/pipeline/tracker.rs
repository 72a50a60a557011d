use std::{fmt::Display, future::Future, time::Instant};

use tracing::{Instrument, debug, warn};

use crate::application::observability::{Observability, SpanStatus};

use super::{context::RequestId, stage::Stage};

/// Wraps stage futures with a duration measurement and a span.
pub(crate) struct StageTracker<'a> {
    observability: &'a dyn Observability,
    request_id: RequestId,
    uri: String,
}

impl<'a> StageTracker<'a> {
    pub(crate) fn new(
        observability: &'a dyn Observability,
        request_id: RequestId,
        uri: String,
    ) -> Self {
        Self {
            observability,
            request_id,
            uri,
        }
    }

    /// Run `work` as `stage`. The span is closed and the duration recorded
    /// whether the stage succeeds or fails.
    pub(crate) async fn track<T, E, F>(&self, stage: Stage, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut span = self
            .observability
            .start_span(stage, self.request_id.as_uuid());
        let started = Instant::now();

        let result = work.instrument(span.tracing_span()).await;

        let elapsed = started.elapsed();
        match &result {
            Ok(_) => {
                span.set_status(SpanStatus::Ok);
                debug!(
                    request_id = %self.request_id,
                    uri = %self.uri,
                    stage = stage.as_str(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "stage completed"
                );
            }
            Err(err) => {
                span.set_status(SpanStatus::Error(err.to_string()));
                warn!(
                    request_id = %self.request_id,
                    uri = %self.uri,
                    stage = stage.as_str(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %err,
                    "stage failed"
                );
            }
        }
        span.end();
        self.observability.observe_stage(stage, elapsed);

        result
    }
}
