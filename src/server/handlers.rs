//! Request handlers.
//!
//! `GET /uploads/<name>` has no handler here: it is a `ServeDir` mounted on
//! the upload directory by the router.

use super::error::ApiResult;
use super::pages::{self, Flash};
use super::AppState;
use crate::config::ALLOWED_EXTENSIONS;
use crate::convert::process_upload;
use crate::error::Tex2HtmlError;
use crate::storage::is_allowed_file;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, SET_COOKIE};
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::info;

// ---------------------------------------------------------------------------
// GET /
// ---------------------------------------------------------------------------

/// Upload form. Shows and clears a pending flash message.
pub async fn upload_page(headers: HeaderMap) -> Response {
    match Flash::from_headers(&headers) {
        Some(flash) => (
            [(SET_COOKIE, Flash::clear_cookie())],
            Html(pages::upload_page(Some(flash))),
        )
            .into_response(),
        None => Html(pages::upload_page(None)).into_response(),
    }
}

// ---------------------------------------------------------------------------
// POST /
// ---------------------------------------------------------------------------

/// Store the `file` field under a random name and redirect to it.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Redirect> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("").to_string();
        if filename.is_empty() {
            return Err(Tex2HtmlError::NoFile.into());
        }
        if !is_allowed_file(&filename) {
            info!("Rejected upload '{}'", filename);
            return Err(Tex2HtmlError::UnsupportedExtension {
                filename,
                allowed: ALLOWED_EXTENSIONS.join(", ."),
            }
            .into());
        }

        let data = field.bytes().await?;
        let name = state.store.save(&data).await?;
        info!("Stored upload '{}' ({} bytes) as {}", filename, data.len(), name);
        return Ok(Redirect::to(&format!("/uploads/{name}")));
    }

    Err(Tex2HtmlError::NoFile.into())
}

// ---------------------------------------------------------------------------
// GET /process/{name}
// ---------------------------------------------------------------------------

/// Run the converter on a stored upload and stream back the artifact.
///
/// The attachment keeps the requested name as its download filename.
pub async fn process_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let done = process_upload(&state.store, state.converter.as_ref(), &name).await?;

    let artifact = &done.output.artifact;
    let file = tokio::fs::File::open(artifact)
        .await
        .map_err(|e| Tex2HtmlError::storage(artifact, e))?;

    let disposition = format!("attachment; filename=\"{}\"", done.upload.name);
    Ok((
        [
            (CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
