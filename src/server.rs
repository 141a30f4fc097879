//! Axum router construction and request gateway.
//!
//! Every request path other than `/` and `/metrics` is classified against
//! the path grammar. A match names the endpoint and region of the target S3
//! service, the bucket, and the object key or prefix. The gateway builds a
//! backend for that endpoint/region with the caller's credentials, wraps the
//! match in a resource handle, and dispatches the HTTP method to the handle.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::auth;
use crate::dispatch::dispatch;
use crate::errors::{generate_request_id, GatewayError};
use crate::grammar;
use crate::metrics::{metrics_handler, metrics_middleware, METRICS_PATH};
use crate::resource::Resource;
use crate::AppState;

/// Body of the root liveness response.
pub const LIVENESS_TEXT: &str = "Proxy is running";

/// Build the axum [`Router`] for the gateway.
pub fn app(state: Arc<AppState>) -> Router {
    let mut router = Router::new().route("/", any(liveness));
    if state.config.observability.metrics {
        router = router.route(METRICS_PATH, get(metrics_handler));
    }

    router
        .fallback(gateway)
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        // Uploads are bounded by `server.max_object_size` in the dispatcher.
        .layer(DefaultBodyLimit::disable())
}

// -- Common headers middleware -----------------------------------------------

/// Adds `x-request-id`, `date` and `server` to every response.
async fn common_headers_middleware(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("s3-path-proxy"));

    response
}

// -- Liveness ----------------------------------------------------------------

/// `/` with any method. Never touches a backend.
async fn liveness() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        LIVENESS_TEXT,
    )
}

// -- Gateway -----------------------------------------------------------------

/// Fallback handler: classify, build a backend, dispatch.
async fn gateway(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
) -> Result<Response, GatewayError> {
    let (parts, body) = req.into_parts();

    let Some(matched) = grammar::classify_request_path(parts.uri.path()) else {
        debug!(path = parts.uri.path(), "path matches no grammar shape");
        return Err(GatewayError::NoPathMatch);
    };

    let credentials = auth::extract_credentials(&parts.headers);
    debug!(
        level = matched.level().as_str(),
        endpoint = matched.endpoint(),
        region = matched.region(),
        authenticated = credentials.is_some(),
        "classified request"
    );

    let backend = state
        .factory
        .make_backend(matched.endpoint(), matched.region(), credentials)
        .await
        .map_err(GatewayError::BackendConstruction)?;

    let resource = Resource::from_match(matched, backend);
    let dispatched = dispatch(
        &resource,
        &parts.method,
        body,
        state.config.server.max_object_size,
    )
    .await?;

    Ok(dispatched.outcome.into_response())
}

// -- Tests -------------------------------------------------------------------
