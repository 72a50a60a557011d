//! The staged render pipeline.
//!
//! Every request walks `ingest → validate → build → render → respond`. Each
//! stage returns a tagged result; the first failure ends the request and is
//! turned into a response here, in one place, together with the outcome
//! counters. An oversized body is the only failure that produces no response:
//! it is marked with [`ConnectionAbort`] and the server drops the connection.

mod context;
mod error;
mod ingest;
mod stage;
mod tracker;

use std::{error::Error as StdError, path::Path, sync::Arc};

use axum::{
    body::Body,
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::Stream;
use tracing::{debug, error, info, warn};

use crate::{
    application::{
        builder::{JsonTreeBuilder, TreeBuilder},
        observability::{Observability, RequestCounter},
        render::{RenderError, Renderer},
        validation::{
            PayloadValidator, SchemaValidator, ValidationOutcome, requires_validation,
        },
    },
    config::Settings,
    domain::{filename::derive_filename, payload::Payload, tree::DocumentTree},
    infra::artifacts::{ArtifactHandle, ArtifactStore},
};

pub use context::{RequestContext, RequestId};
pub use error::PipelineError;
pub use stage::{PipelineState, Stage};

use tracker::StageTracker;

/// Response extension asking the server to drop the connection unanswered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionAbort;

pub const DEFAULT_MAX_BODY_BYTES: usize = 30_000_000;
pub const DEFAULT_TITLE: &str = "document";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Validate every payload, whatever its `strict` flag says.
    pub force_validation: bool,
    pub max_body_bytes: usize,
    pub default_title: String,
    pub cleanup_after_response: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            force_validation: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            default_title: DEFAULT_TITLE.to_string(),
            cleanup_after_response: false,
        }
    }
}

impl From<&Settings> for PipelineConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            force_validation: settings.pipeline.validate_payloads,
            max_body_bytes: settings.pipeline.max_body_bytes,
            default_title: settings.pipeline.default_title.clone(),
            cleanup_after_response: settings.artifacts.cleanup_after_response,
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    artifacts: ArtifactStore,
    observability: Arc<dyn Observability>,
    validator: Arc<dyn PayloadValidator>,
    builder: Arc<dyn TreeBuilder>,
    renderer: Arc<dyn Renderer>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        artifacts: ArtifactStore,
        observability: Arc<dyn Observability>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            config,
            artifacts,
            observability,
            validator: Arc::new(SchemaValidator),
            builder: Arc::new(JsonTreeBuilder),
            renderer,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn PayloadValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_tree_builder(mut self, builder: Arc<dyn TreeBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline for an HTTP request body.
    pub async fn handle(&self, uri: &Uri, body: Body) -> Response {
        self.run(uri.to_string(), body.into_data_stream()).await
    }

    /// Run the pipeline over any chunked body stream.
    pub async fn run<S, E>(&self, uri: String, stream: S) -> Response
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let mut ctx = RequestContext::new(uri);
        self.observability.increment(RequestCounter::Attempted);
        debug!(request_id = %ctx.id, uri = %ctx.uri, "render request received");

        let mut response = match self.execute(&mut ctx, stream).await {
            Ok(response) => {
                ctx.state = PipelineState::Done;
                self.observability.increment(RequestCounter::Succeeded);
                info!(
                    request_id = %ctx.id,
                    uri = %ctx.uri,
                    elapsed_ms = ctx.elapsed_ms() as u64,
                    "render request completed"
                );
                response
            }
            Err(err) => {
                ctx.fail(err.stage());
                self.report_failure(&ctx, &err);
                err.into_response()
            }
        };

        response.extensions_mut().insert(ctx.id);
        response
    }

    fn report_failure(&self, ctx: &RequestContext, err: &PipelineError) {
        let elapsed_ms = ctx.elapsed_ms() as u64;
        match err {
            PipelineError::IngestOverflow { limit, received } => {
                // The request never reached end-of-stream, so only the attempt is counted.
                warn!(
                    request_id = %ctx.id,
                    uri = %ctx.uri,
                    stage = err.stage().as_str(),
                    limit,
                    received,
                    elapsed_ms,
                    "request body exceeded limit; aborting connection"
                );
            }
            PipelineError::Build(build) => {
                self.observability.increment(RequestCounter::Failed);
                error!(
                    request_id = %ctx.id,
                    uri = %ctx.uri,
                    stage = err.stage().as_str(),
                    kind = build.name(),
                    render_stack = %build.render_stack.join(" > "),
                    elapsed_ms,
                    error = %build,
                    "document tree could not be built"
                );
            }
            PipelineError::Render(RenderError::Io { path, source }) => {
                self.observability.increment(RequestCounter::Failed);
                error!(
                    request_id = %ctx.id,
                    uri = %ctx.uri,
                    stage = err.stage().as_str(),
                    path = %path.display(),
                    elapsed_ms,
                    error = %source,
                    "rendered artifact could not be written"
                );
            }
            _ => {
                self.observability.increment(RequestCounter::Failed);
                error!(
                    request_id = %ctx.id,
                    uri = %ctx.uri,
                    stage = err.stage().as_str(),
                    backstop = err.is_backstop(),
                    elapsed_ms,
                    error = %err,
                    "render request failed"
                );
            }
        }
    }

    async fn execute<S, E>(
        &self,
        ctx: &mut RequestContext,
        stream: S,
    ) -> Result<Response, PipelineError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let tracker = StageTracker::new(self.observability.as_ref(), ctx.id, ctx.uri.clone());

        let payload = tracker.track(Stage::Ingest, self.ingest(ctx, stream)).await?;
        let payload: &Payload = ctx.payload.insert(payload);

        ctx.state = PipelineState::Validating;
        tracker.track(Stage::Validate, self.validate(payload)).await?;

        ctx.state = PipelineState::Building;
        let tree = tracker.track(Stage::Build, self.build(payload)).await?;

        ctx.state = PipelineState::Rendering;
        let artifact = tracker.track(Stage::Render, self.render(&tree)).await?;
        let artifact: &ArtifactHandle = ctx.artifact.insert(artifact);

        ctx.state = PipelineState::Responding;
        tracker
            .track(Stage::Respond, self.respond(payload, artifact))
            .await
    }

    async fn ingest<S, E>(
        &self,
        ctx: &mut RequestContext,
        stream: S,
    ) -> Result<Payload, PipelineError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        ctx.state = PipelineState::Ingesting;
        ingest::read_body(&mut ctx.body, stream, self.config.max_body_bytes).await?;

        ctx.state = PipelineState::Parsing;
        Ok(Payload::from_slice(&ctx.body)?)
    }

    async fn validate(&self, payload: &Payload) -> Result<(), PipelineError> {
        if !requires_validation(self.config.force_validation, payload) {
            debug!("payload validation skipped");
            return Ok(());
        }
        match self.validator.validate(payload) {
            ValidationOutcome::Valid => Ok(()),
            ValidationOutcome::Invalid(issues) => Err(PipelineError::Validation(issues)),
        }
    }

    async fn build(&self, payload: &Payload) -> Result<DocumentTree, PipelineError> {
        self.builder
            .generate(payload)
            .await
            .map_err(PipelineError::Build)
    }

    async fn render(&self, tree: &DocumentTree) -> Result<ArtifactHandle, PipelineError> {
        self.artifacts
            .ensure_directory()
            .await
            .map_err(|err| PipelineError::Render(RenderError::io(self.artifacts.root(), err)))?;
        let artifact = self.artifacts.allocate();

        self.renderer
            .render(tree, artifact.path())
            .await
            .map_err(PipelineError::Render)?;
        Ok(artifact)
    }

    async fn respond(
        &self,
        payload: &Payload,
        artifact: &ArtifactHandle,
    ) -> Result<Response, PipelineError> {
        let bytes = self
            .artifacts
            .read(artifact)
            .await
            .map_err(|source| PipelineError::ReadBack {
                path: artifact.path().to_path_buf(),
                source,
            })?;

        if self.config.cleanup_after_response {
            self.artifacts.discard(artifact).await;
        }

        let filename = derive_filename(payload.title(), &self.config.default_title);
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/pdf")
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}.pdf\""),
            )
            .header(header::CONTENT_LENGTH, bytes.len())
            .body(Body::from(bytes))
            .map_err(|err| PipelineError::Response(err.to_string()))
    }

    /// Validate, build and render a payload straight to `output`, bypassing
    /// the HTTP surface and the request counters.
    pub async fn render_offline(&self, body: &[u8], output: &Path) -> Result<(), PipelineError> {
        let payload = Payload::from_slice(body)?;
        if requires_validation(self.config.force_validation, &payload)
            && let ValidationOutcome::Invalid(issues) = self.validator.validate(&payload)
        {
            return Err(PipelineError::Validation(issues));
        }

        let tree = self.build(&payload).await?;
        if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| PipelineError::Render(RenderError::io(parent, err)))?;
        }
        self.renderer
            .render(&tree, output)
            .await
            .map_err(PipelineError::Render)
    }
}
