use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::pages::PageServiceError;
use crate::application::repos::RepoError;
use crate::application::users::UserServiceError;
use crate::domain::error::DomainError;

/// Machine-readable `error.code` values.
pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const NOT_FOUND: &str = "not_found";
    pub const CONFLICT: &str = "conflict";
    pub const CYCLE: &str = "cycle";
    pub const DUPLICATE: &str = "duplicate";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const INTEGRITY: &str = "integrity_error";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const REPO: &str = "repo_error";
}

/// Failure rendered as `{"error": {"code", "message", "hint"?}}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    error: Detail<'a>,
}

#[derive(Serialize)]
struct Detail<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
}

impl ApiError {
    const fn of(status: StatusCode, code: &'static str, message: &'static str) -> Self {
        Self {
            status,
            code,
            message,
            hint: None,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self {
            hint,
            ..Self::of(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message)
        }
    }

    pub fn unauthorized(message: &'static str) -> Self {
        Self::of(StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED, message)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::of(StatusCode::NOT_FOUND, codes::NOT_FOUND, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::not_found("Resource not found"),
            RepoError::Duplicate { constraint } => {
                Self::of(StatusCode::CONFLICT, codes::DUPLICATE, "Duplicate record")
                    .with_hint(constraint)
            }
            RepoError::InvalidInput { message } => {
                Self::of(StatusCode::BAD_REQUEST, codes::INVALID_INPUT, "Invalid input")
                    .with_hint(message)
            }
            RepoError::Integrity { message } => Self::of(
                StatusCode::CONFLICT,
                codes::INTEGRITY,
                "Integrity constraint violated",
            )
            .with_hint(message),
            RepoError::Timeout => Self::of(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::DB_TIMEOUT,
                "Database timeout",
            ),
            RepoError::Persistence(message) => Self::of(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::REPO,
                "Persistence error",
            )
            .with_hint(message),
        }
    }
}

impl From<PageServiceError> for ApiError {
    fn from(err: PageServiceError) -> Self {
        match err {
            PageServiceError::NotFound => Self::not_found("Page not found"),
            PageServiceError::Unauthorized => Self::unauthorized("Page is not public"),
            PageServiceError::Conflict(message) => {
                Self::of(StatusCode::CONFLICT, codes::CONFLICT, "Conflicting record")
                    .with_hint(message)
            }
            PageServiceError::Domain(DomainError::Validation { message }) => {
                Self::bad_request("Invalid page payload", Some(message))
            }
            PageServiceError::Domain(err @ DomainError::Cycle { .. }) => Self::of(
                StatusCode::BAD_REQUEST,
                codes::CYCLE,
                "Page hierarchy would contain a cycle",
            )
            .with_hint(err.to_string()),
            PageServiceError::Repo(err) => err.into(),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::NotFound => Self::not_found("User not found"),
            UserServiceError::Repo(err) => err.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = Envelope {
            error: Detail {
                code: self.code,
                message: self.message,
                hint: self.hint.as_deref(),
            },
        };
        let mut response = (self.status, Json(envelope)).into_response();
        let summary = format!(
            "{}: {}",
            self.code,
            self.hint.as_deref().unwrap_or(self.message)
        );
        ErrorReport::from_message("infra::http", self.status, summary).attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: PageServiceError) -> StatusCode {
        ApiError::from(err).status()
    }

    #[test]
    fn page_errors_map_to_statuses() {
        assert_eq!(status_of(PageServiceError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(PageServiceError::Unauthorized),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(PageServiceError::Conflict("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DomainError::validation("bad").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(DomainError::cycle("p1").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(RepoError::Timeout.into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(RepoError::from_persistence("boom").into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_carries_report_for_logging() {
        let response = ApiError::from(PageServiceError::Conflict("element `e1`".into()))
            .into_response();
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.status, StatusCode::CONFLICT);
        assert!(report.messages[0].contains("element `e1`"));
    }
}
