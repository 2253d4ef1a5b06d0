//! HTTP trigger intake
//!
//! Thin webhook front end over the dispatcher: a request to
//! `/jobs/{name}` becomes an `enqueue` call, with query parameters as
//! string params, the raw body passed through for payload decoding, and
//! the authorization header forwarded for credential checks. Acceptance
//! is immediate; the job runs detached and its outcome never surfaces
//! here.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;
use tracing::warn;

use wharf_lua::LoadError;

use crate::dispatcher::{Dispatcher, EnqueueError};

pub struct AppState {
    pub dispatcher: Dispatcher,
}

/// Create the router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/jobs/{name}", get(trigger_job).post(trigger_job))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn index() -> &'static str {
    "wharf automation server\n"
}

async fn trigger_job(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, EnqueueError> {
    let mut params = Map::new();
    for (key, value) in query {
        params.insert(key, Value::String(value));
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    state.dispatcher.enqueue(&name, params, auth_header, &body)?;
    Ok("OK")
}

impl IntoResponse for EnqueueError {
    fn into_response(self) -> Response {
        match self {
            EnqueueError::Auth(err) => {
                let mut response = (
                    StatusCode::UNAUTHORIZED,
                    "you are not authorized to trigger this job\n",
                )
                    .into_response();
                if let Ok(challenge) =
                    HeaderValue::try_from(format!("Basic realm=\"{}\"", err.job))
                {
                    response
                        .headers_mut()
                        .insert(header::WWW_AUTHENTICATE, challenge);
                }
                response
            }
            EnqueueError::InvalidName(_) | EnqueueError::Load(LoadError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "no such job\n").into_response()
            }
            EnqueueError::Load(err) => {
                warn!("rejected trigger: {}", err);
                (
                    StatusCode::BAD_REQUEST,
                    format!("invalid job definition: {err}\n"),
                )
                    .into_response()
            }
            EnqueueError::Closed => {
                (StatusCode::SERVICE_UNAVAILABLE, "shutting down\n").into_response()
            }
        }
    }
}
