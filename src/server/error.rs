//! HTTP mapping of library errors.
//!
//! Each failure class keeps the response shape the service has always had:
//! user mistakes become redirects or small HTML pages, tool failures become
//! the `{"error", "details"}` JSON body with a 500.

use super::pages::{Flash, NOT_FOUND_PAGE, REJECTED_PAGE};
use crate::error::Tex2HtmlError;
use axum::extract::multipart::MultipartError;
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use serde::Serialize;

/// JSON body for server-side failures.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: String,
}

/// Error type returned by every handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    App(#[from] Tex2HtmlError),

    /// Malformed or oversized multipart body.
    #[error(transparent)]
    Multipart(#[from] MultipartError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Multipart(e) => {
                tracing::debug!(error = %e, "Rejected multipart body");
                return e.into_response();
            }
            ApiError::App(e) => e,
        };

        match err {
            Tex2HtmlError::NoFile => (
                [(SET_COOKIE, Flash::NoFile.set_cookie())],
                Redirect::to("/"),
            )
                .into_response(),

            Tex2HtmlError::UnsupportedExtension { .. } => {
                (StatusCode::BAD_REQUEST, Html(REJECTED_PAGE)).into_response()
            }

            Tex2HtmlError::UploadNotFound { .. } => {
                (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)).into_response()
            }

            Tex2HtmlError::Conversion(e) => {
                tracing::warn!(error = %e, "Conversion failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody {
                        error: "Conversion failed".to_string(),
                        details: e.details(),
                    }),
                )
                    .into_response()
            }

            other => {
                tracing::error!(error = %other, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody {
                        error: "Internal error".to_string(),
                        details: other.to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use axum::http::header::LOCATION;

    #[test]
    fn no_file_redirects_home_with_flash() {
        let resp = ApiError::from(Tex2HtmlError::NoFile).into_response();
        assert!(resp.status().is_redirection());
        assert_eq!(resp.headers()[LOCATION], "/");
        let cookie = resp.headers()[SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("flash=no-file"));
    }

    #[test]
    fn statuses_per_error_class() {
        let cases = [
            (
                Tex2HtmlError::UnsupportedExtension {
                    filename: "a.png".into(),
                    allowed: "tex".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                Tex2HtmlError::UploadNotFound { name: "x".into() },
                StatusCode::NOT_FOUND,
            ),
            (
                Tex2HtmlError::Conversion(ConvertError::ExitStatus {
                    code: Some(2),
                    stderr: "boom".into(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Tex2HtmlError::NameExhausted { attempts: 8 },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
