use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("page `{page_uuid}` would become its own ancestor")]
    Cycle { page_uuid: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn cycle(page_uuid: impl Into<String>) -> Self {
        Self::Cycle {
            page_uuid: page_uuid.into(),
        }
    }
}
