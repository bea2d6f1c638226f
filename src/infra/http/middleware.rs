use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::auth::AuthError;
use crate::application::error::ErrorReport;

use super::ApiState;
use super::caller::{Caller, presented_token};

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Tag each request with an id, reusing the client's `x-request-id` when it
/// sends a usable one, and echo it on the response.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
    let ctx = RequestContext { request_id };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Attach a [`Caller`] to every request. Bad credentials never fail here;
/// handlers that need a user reject anonymous callers themselves.
pub async fn resolve_caller(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let caller = match presented_token(request.headers()) {
        Some(token) => match state.authenticator.authenticate(&token).await {
            Ok(user) => Some(user),
            Err(err @ (AuthError::Missing | AuthError::Invalid)) => {
                debug!(
                    target = "opaline::http::auth",
                    error = %err,
                    "credentials rejected; treating caller as anonymous"
                );
                None
            }
            Err(err) => {
                warn!(
                    target = "opaline::http::auth",
                    error = %err,
                    "authentication failed; treating caller as anonymous"
                );
                None
            }
        },
        None => None,
    };

    request.extensions_mut().insert(Caller(caller));
    let mut response = next.run(request).await;
    response.extensions_mut().insert(Caller(caller));
    response
}

/// Log every 4xx/5xx with the diagnostic chain the handler attached.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let request_id = response
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();
    let caller = response
        .extensions()
        .get::<Caller>()
        .and_then(|caller| caller.0)
        .map(|user| user.to_string())
        .unwrap_or_else(|| "anonymous".to_string());
    let (source, chain) = response
        .extensions_mut()
        .remove::<ErrorReport>()
        .map(|report| (report.source, report.messages))
        .unwrap_or(("unknown", Vec::new()));
    let detail = chain.first().map(String::as_str).unwrap_or("-");
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if status.is_server_error() {
        error!(
            target = "opaline::http::response",
            status = status.as_u16(),
            %method,
            path,
            elapsed_ms,
            source,
            detail,
            ?chain,
            request_id,
            caller,
            "request failed"
        );
    } else {
        debug!(
            target = "opaline::http::response",
            status = status.as_u16(),
            %method,
            path,
            elapsed_ms,
            source,
            detail,
            request_id,
            caller,
            "request rejected"
        );
    }

    response
}
