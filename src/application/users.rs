use std::sync::Arc;

use opaline_api_types::UserResponse;
use thiserror::Error;

use crate::application::repos::{RepoError, UsersRepo};
use crate::domain::types::UserId;

#[derive(Debug, Error)]
pub enum UserServiceError {
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UsersRepo>,
}

impl UserService {
    pub fn new(users: Arc<dyn UsersRepo>) -> Self {
        Self { users }
    }

    pub async fn get_user(&self, id: UserId) -> Result<UserResponse, UserServiceError> {
        let record = self
            .users
            .find_user(id)
            .await?
            .ok_or(UserServiceError::NotFound)?;

        Ok(UserResponse {
            id: record.id.as_uuid(),
            email: record.email,
            name: record.name,
            picture: record.picture,
            status: record.status,
        })
    }
}
