use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use opaline_api_types::{
    EmptyResponse, PageCreateRequest, PageDeleteRequest, PageListResponse, PageUpdateRequest,
    UserResponse,
};

use crate::application::pages::{CreatePageCommand, PageView, UpdatePageCommand};

use super::ApiState;
use super::caller::{Caller, RequireUser};
use super::db_health_response;
use super::error::ApiError;

fn payload<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    result
        .map(|Json(value)| value)
        .map_err(|rejection| {
            ApiError::bad_request("Malformed request body", Some(rejection.body_text()))
        })
}

pub async fn page_create(
    State(state): State<ApiState>,
    RequireUser(owner): RequireUser,
    body: Result<Json<PageCreateRequest>, JsonRejection>,
) -> Result<Json<EmptyResponse>, ApiError> {
    let request = payload(body)?;
    let command = CreatePageCommand {
        page_uuid: request.page_uuid,
        page_name: request.page_name,
        is_root: request.is_root,
        parent_page_uuid: request.parent_page_uuid,
        element_positions: request.element_positions,
        public_page: request.public_page,
        is_favourite: request.is_favourite,
        etc: request.etc,
        elements: request.elements,
    };

    state.pages.create_page(owner, command).await?;
    Ok(Json(EmptyResponse {}))
}

pub async fn page_update(
    State(state): State<ApiState>,
    RequireUser(owner): RequireUser,
    body: Result<Json<PageUpdateRequest>, JsonRejection>,
) -> Result<Json<EmptyResponse>, ApiError> {
    let PageUpdateRequest { page, elements } = payload(body)?;
    let command = UpdatePageCommand {
        page_uuid: page.page_uuid,
        page_name: page.page_name,
        is_root: page.is_root,
        public_page: page.public_page,
        is_favourite: page.is_favourite,
        elements,
    };

    state.pages.update_page(owner, command).await?;
    Ok(Json(EmptyResponse {}))
}

pub async fn page_get(
    State(state): State<ApiState>,
    Caller(caller): Caller,
    Path(page_uuid): Path<String>,
) -> Result<Json<PageView>, ApiError> {
    let view = state.pages.get_page(&page_uuid, caller).await?;
    Ok(Json(view))
}

pub async fn page_list(
    State(state): State<ApiState>,
    RequireUser(owner): RequireUser,
) -> Result<Json<PageListResponse>, ApiError> {
    let pages = state.pages.list_pages(owner).await?;
    Ok(Json(PageListResponse { pages }))
}

pub async fn page_delete(
    State(state): State<ApiState>,
    RequireUser(owner): RequireUser,
    body: Result<Json<PageDeleteRequest>, JsonRejection>,
) -> Result<Json<EmptyResponse>, ApiError> {
    let request = payload(body)?;
    state.pages.delete_page(owner, &request.page_uuid).await?;
    Ok(Json(EmptyResponse {}))
}

pub async fn user_get(
    State(state): State<ApiState>,
    RequireUser(user): RequireUser,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(state.users.get_user(user).await?))
}

pub async fn health(State(state): State<ApiState>) -> Response {
    match state.db.as_ref() {
        Some(db) => db_health_response(db.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
