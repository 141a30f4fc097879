//! Gateway error types.
//!
//! Every variant maps to one HTTP status code. The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(GatewayError::NoPathMatch)`; the body is always a single line of
//! plain text.

use axum::http::header::{ALLOW, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::warn;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The path matches none of the grammar shapes.
    #[error("Not Found")]
    NoPathMatch,

    /// The path matched, but its resource level has no operation for the method.
    #[error("Method not allowed")]
    MethodNotAllowed {
        /// Value for the `Allow` response header.
        allow: &'static str,
    },

    /// The storage backend could not be built for the requested endpoint/region/credentials.
    #[error("{0:#}")]
    BackendConstruction(#[source] anyhow::Error),

    /// The storage call itself failed.
    #[error("{0:#}")]
    Backend(#[source] anyhow::Error),

    /// An upload arrived without a declared length.
    #[error("Content-Length is required for uploads")]
    LengthRequired,

    /// An upload declared more bytes than `server.max_object_size` allows.
    #[error("Upload of {size} bytes exceeds the {limit} byte limit")]
    EntityTooLarge { size: u64, limit: u64 },
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NoPathMatch => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::BackendConstruction(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::LengthRequired => StatusCode::LENGTH_REQUIRED,
            GatewayError::EntityTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!("{}: {}", status, self);
        }

        let body = format!("{self}\n");
        match self {
            GatewayError::MethodNotAllowed { allow } => (
                status,
                [
                    (CONTENT_TYPE, "text/plain; charset=utf-8"),
                    (ALLOW, allow),
                ],
                body,
            )
                .into_response(),
            _ => (status, [(CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response(),
        }
    }
}

// -- Tests -------------------------------------------------------------------
