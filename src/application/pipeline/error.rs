use std::{error::Error as StdError, io, path::PathBuf};

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{
        builder::BuildError, error::ErrorReport, render::RenderError, validation::ValidationIssue,
    },
    domain::payload::PayloadError,
};

use super::{ConnectionAbort, stage::Stage};

/// Terminal failure of a request, tagged with the stage that produced it.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("request body exceeded {limit} bytes (received {received})")]
    IngestOverflow { limit: usize, received: usize },
    #[error("failed to read request body: {0}")]
    Ingest(Box<dyn StdError + Send + Sync>),
    #[error(transparent)]
    Parse(#[from] PayloadError),
    #[error("payload failed validation with {} issue(s)", .0.len())]
    Validation(Vec<ValidationIssue>),
    #[error(transparent)]
    Build(BuildError),
    #[error(transparent)]
    Render(RenderError),
    #[error("failed to read artifact `{path}`: {source}")]
    ReadBack {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to assemble response: {0}")]
    Response(String),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::IngestOverflow { .. }
            | PipelineError::Ingest(_)
            | PipelineError::Parse(_) => Stage::Ingest,
            PipelineError::Validation(_) => Stage::Validate,
            PipelineError::Build(_) => Stage::Build,
            PipelineError::Render(_) => Stage::Render,
            PipelineError::ReadBack { .. } | PipelineError::Response(_) => Stage::Respond,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::IngestOverflow { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::Validation(_) | PipelineError::Build(_) => StatusCode::BAD_REQUEST,
            PipelineError::Ingest(_)
            | PipelineError::Parse(_)
            | PipelineError::Render(_)
            | PipelineError::ReadBack { .. }
            | PipelineError::Response(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Failures that happen before a structured payload exists. These are
    /// reported through the generic catch-all body rather than a stage message.
    pub fn is_backstop(&self) -> bool {
        matches!(self, PipelineError::Ingest(_) | PipelineError::Parse(_))
    }

    /// Whether the connection is dropped instead of answered.
    pub fn aborts_connection(&self) -> bool {
        matches!(self, PipelineError::IngestOverflow { .. })
    }

    /// Plain-text body sent to the client.
    pub fn public_body(&self) -> String {
        match self {
            PipelineError::IngestOverflow { .. } => String::new(),
            PipelineError::Ingest(_) | PipelineError::Parse(_) => {
                format!("Error generating the pdf: {self}.")
            }
            PipelineError::Validation(issues) => {
                let rendered = serde_json::to_string_pretty(issues)
                    .unwrap_or_else(|_| format!("{issues:?}"));
                format!("The request was not valid: {rendered}.")
            }
            PipelineError::Build(err) => err.client_message(),
            PipelineError::Render(err) => format!("Error rendering the file: {err}."),
            PipelineError::ReadBack { source, .. } => format!("Error getting the file: {source}."),
            PipelineError::Response(message) => format!("Error getting the file: {message}."),
        }
    }

    fn source_label(&self) -> &'static str {
        match self {
            PipelineError::IngestOverflow { .. } => "application::pipeline::ingest",
            PipelineError::Ingest(_) | PipelineError::Parse(_) => "application::pipeline::backstop",
            PipelineError::Validation(_) => "application::pipeline::validate",
            PipelineError::Build(_) => "application::pipeline::build",
            PipelineError::Render(_) => "application::pipeline::render",
            PipelineError::ReadBack { .. } | PipelineError::Response(_) => {
                "application::pipeline::respond"
            }
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let report = ErrorReport::from_error(self.source_label(), status, &self);

        let mut response = if self.aborts_connection() {
            let mut response = status.into_response();
            response.extensions_mut().insert(ConnectionAbort);
            response
        } else {
            (
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                self.public_body(),
            )
                .into_response()
        };
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use crate::application::builder::BuildErrorKind;

    use super::*;

    #[test]
    fn client_failures_are_400_and_server_failures_500() {
        let build = PipelineError::Build(BuildError::new(BuildErrorKind::MissingField, "no"));
        assert_eq!(build.status(), StatusCode::BAD_REQUEST);
        assert_eq!(PipelineError::Validation(Vec::new()).status(), StatusCode::BAD_REQUEST);

        let render = PipelineError::Render(RenderError::EmptyDocument);
        assert_eq!(render.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(render.public_body(), "Error rendering the file: document tree has no pages.");
        assert_eq!(render.stage(), Stage::Render);
    }

    #[test]
    fn parse_failures_use_the_backstop_body() {
        let parse_error = serde_json::from_slice::<serde_json::Value>(b"{\"title\":")
            .expect_err("truncated json");
        let err = PipelineError::Parse(PayloadError::Malformed(parse_error));
        assert!(err.is_backstop());
        assert_eq!(err.stage(), Stage::Ingest);
        assert!(err.public_body().starts_with("Error generating the pdf: malformed JSON body"));
    }

    #[test]
    fn render_io_failures_show_the_cause_but_not_the_artifact_path() {
        let err = PipelineError::Render(RenderError::io(
            std::path::Path::new("/var/tmp/pdf-renderer/3f1c.pdf"),
            io::Error::new(io::ErrorKind::StorageFull, "no space left on device"),
        ));
        let body = err.public_body();
        assert_eq!(
            body,
            "Error rendering the file: failed to write artifact: no space left on device."
        );
        assert!(!body.contains("/var/tmp"));
    }

    #[test]
    fn overflow_response_is_marked_for_abort_and_has_no_body() {
        let response = PipelineError::IngestOverflow {
            limit: 1,
            received: 2,
        }
        .into_response();
        assert!(response.extensions().get::<ConnectionAbort>().is_some());
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn failing_responses_carry_an_error_report() {
        let response = PipelineError::Response("broken".to_string()).into_response();
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("error report");
        assert_eq!(report.source, "application::pipeline::respond");
        assert_eq!(report.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(&b"text/plain; charset=utf-8"[..])
        );
    }
}
