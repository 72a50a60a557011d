use axum::{
    body::Body,
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};

use crate::application::error::HttpError;

use super::HttpState;

pub(super) async fn render_document(
    State(state): State<HttpState>,
    uri: Uri,
    body: Body,
) -> Response {
    state.pipeline.handle(&uri, body).await
}

pub(super) async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub(super) async fn not_found(uri: Uri) -> Response {
    HttpError::new(
        "infra::http::not_found",
        StatusCode::NOT_FOUND,
        "Not found",
        format!("no route for `{}`", uri.path()),
    )
    .into_response()
}
