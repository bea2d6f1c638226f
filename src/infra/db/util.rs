use sqlx::error::{DatabaseError, ErrorKind};

use crate::application::repos::RepoError;

/// SQLSTATE codes that describe bad caller input rather than a broken store.
const INVALID_TEXT_REPRESENTATION: &str = "22P02";
const STRING_DATA_RIGHT_TRUNCATION: &str = "22001";
const QUERY_CANCELED: &str = "57014";

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) => map_database_error(db.as_ref()),
        other => RepoError::from_persistence(other),
    }
}

fn map_database_error(db: &dyn DatabaseError) -> RepoError {
    let code = db.code();
    match (db.kind(), code.as_deref()) {
        (ErrorKind::UniqueViolation, _) => RepoError::Duplicate {
            constraint: db.constraint().unwrap_or("unknown").to_string(),
        },
        (ErrorKind::ForeignKeyViolation, _)
        | (_, Some(INVALID_TEXT_REPRESENTATION | STRING_DATA_RIGHT_TRUNCATION)) => {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        (ErrorKind::NotNullViolation | ErrorKind::CheckViolation, _) => RepoError::Integrity {
            message: db.message().to_string(),
        },
        (_, Some(QUERY_CANCELED)) => RepoError::Timeout,
        _ => RepoError::from_persistence(db.message().to_string()),
    }
}
