use std::{sync::Once, time::Duration};

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use tracing::{Span, field};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};
use uuid::Uuid;

use crate::{
    application::{
        observability::{
            Observability, RequestCounter, STAGE_DURATION_METRIC, SpanStatus, StageSpan,
        },
        pipeline::Stage,
    },
    config::{LogFormat, LoggingSettings},
};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            RequestCounter::Attempted.metric_name(),
            Unit::Count,
            "Total number of render requests received."
        );
        describe_counter!(
            RequestCounter::Succeeded.metric_name(),
            Unit::Count,
            "Total number of render requests answered with a PDF."
        );
        describe_counter!(
            RequestCounter::Failed.metric_name(),
            Unit::Count,
            "Total number of render requests answered with an error."
        );
        describe_histogram!(
            STAGE_DURATION_METRIC,
            Unit::Milliseconds,
            "Render pipeline stage latency in milliseconds, labelled by stage."
        );
    });
}

/// Observability backed by the `metrics` facade and `tracing` spans.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObservability;

impl Observability for MetricsObservability {
    fn increment(&self, counter: RequestCounter) {
        counter!(counter.metric_name()).increment(1);
    }

    fn observe_stage(&self, stage: Stage, elapsed: Duration) {
        histogram!(STAGE_DURATION_METRIC, "stage" => stage.as_str())
            .record(elapsed.as_secs_f64() * 1000.0);
    }

    fn start_span(&self, stage: Stage, request_id: Uuid) -> Box<dyn StageSpan> {
        let span = tracing::info_span!(
            "pipeline.stage",
            stage = stage.as_str(),
            request_id = %request_id,
            status = field::Empty,
            error.message = field::Empty,
        );
        Box::new(TracingStageSpan { span })
    }
}

struct TracingStageSpan {
    span: Span,
}

impl StageSpan for TracingStageSpan {
    fn set_status(&mut self, status: SpanStatus) {
        match status {
            SpanStatus::Ok => {
                self.span.record("status", "ok");
            }
            SpanStatus::Error(message) => {
                self.span.record("status", "error");
                self.span.record("error.message", message.as_str());
            }
        }
    }

    fn tracing_span(&self) -> Span {
        self.span.clone()
    }

    fn end(self: Box<Self>) {
        drop(self.span);
    }
}
