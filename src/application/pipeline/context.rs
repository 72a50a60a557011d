use std::{fmt, time::Instant};

use bytes::BytesMut;
use uuid::Uuid;

use crate::{domain::payload::Payload, infra::artifacts::ArtifactHandle};

use super::stage::{PipelineState, Stage};

/// Per-request identifier used for log correlation and span labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// State owned by the pipeline for the lifetime of one request.
#[derive(Debug)]
pub struct RequestContext {
    pub id: RequestId,
    pub uri: String,
    pub body: BytesMut,
    pub payload: Option<Payload>,
    pub artifact: Option<ArtifactHandle>,
    pub state: PipelineState,
    pub started_at: Instant,
}

impl RequestContext {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            uri: uri.into(),
            body: BytesMut::new(),
            payload: None,
            artifact: None,
            state: PipelineState::Ingesting,
            started_at: Instant::now(),
        }
    }

    pub fn fail(&mut self, stage: Stage) {
        self.state = PipelineState::Failed(stage);
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }
}
