mod caller;
pub mod error;
mod handlers;
mod middleware;

pub use caller::{Caller, RequireUser};

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use sqlx::Error as SqlxError;

use crate::application::auth::Authenticator;
use crate::application::error::ErrorReport;
use crate::application::pages::PageService;
use crate::application::users::UserService;
use crate::infra::db::PostgresRepositories;

#[derive(Clone)]
pub struct ApiState {
    pub pages: Arc<PageService>,
    pub users: Arc<UserService>,
    pub authenticator: Arc<dyn Authenticator>,
    /// `None` when running on the in-memory store.
    pub db: Option<Arc<PostgresRepositories>>,
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

pub fn build_router(state: ApiState) -> Router {
    let caller_state = state.clone();

    Router::new()
        .route("/page-create", post(handlers::page_create))
        .route("/page-update", post(handlers::page_update))
        .route("/page-get/{page_uuid}", get(handlers::page_get))
        .route("/page-list", get(handlers::page_list))
        .route("/page-delete", post(handlers::page_delete))
        .route("/user-get", get(handlers::user_get))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            caller_state,
            middleware::resolve_caller,
        ))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .layer(axum_middleware::from_fn(middleware::log_responses))
}
