use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CreateUserParams, RepoError, UpdateUserTokenParams, UsersRepo};
use crate::domain::entities::UserRecord;
use crate::domain::types::{AccountStatus, UserId};

use super::{PostgresRepositories, map_sqlx_error};

const USER_COLUMNS: &str = "SELECT id, email, name, picture, status, token_prefix, token_hash, \
     created_at, updated_at FROM users";

const USER_RETURNING: &str = " RETURNING id, email, name, picture, status, token_prefix, \
     token_hash, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    picture: String,
    status: String,
    token_prefix: Option<String>,
    token_hash: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = RepoError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<AccountStatus>()
            .map_err(|err| RepoError::Integrity {
                message: err.to_string(),
            })?;

        Ok(UserRecord {
            id: UserId::new(row.id),
            email: row.email,
            name: row.name,
            picture: row.picture,
            status,
            token_prefix: row.token_prefix,
            token_hash: row.token_hash,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl PostgresRepositories {
    async fn fetch_user(
        &self,
        mut qb: QueryBuilder<'_, Postgres>,
    ) -> Result<Option<UserRecord>, RepoError> {
        qb.build_query_as::<UserRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(UserRecord::try_from)
            .transpose()
    }
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(USER_COLUMNS);
        qb.push(" WHERE id = ");
        qb.push_bind(id.as_uuid());
        self.fetch_user(qb).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(USER_COLUMNS);
        qb.push(" WHERE email = ");
        qb.push_bind(email);
        self.fetch_user(qb).await
    }

    async fn find_by_token_prefix(&self, prefix: &str) -> Result<Option<UserRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(USER_COLUMNS);
        qb.push(" WHERE token_prefix = ");
        qb.push_bind(prefix);
        self.fetch_user(qb).await
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO users (id, email, name, picture, status, created_at, updated_at) ",
        );
        qb.push_values(std::iter::once(&params), |mut row, params| {
            row.push_bind(Uuid::new_v4())
                .push_bind(&params.email)
                .push_bind(&params.name)
                .push_bind(&params.picture)
                .push_bind(AccountStatus::default().as_str())
                .push_bind(now)
                .push_bind(now);
        });
        qb.push(USER_RETURNING);

        let row = qb
            .build_query_as::<UserRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        UserRecord::try_from(row)
    }

    async fn update_token(&self, params: UpdateUserTokenParams) -> Result<UserRecord, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET token_prefix = ");
        qb.push_bind(&params.token_prefix);
        qb.push(", token_hash = ");
        qb.push_bind(&params.token_hash);
        qb.push(", updated_at = now() WHERE id = ");
        qb.push_bind(params.id.as_uuid());
        qb.push(USER_RETURNING);

        let row = qb
            .build_query_as::<UserRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        UserRecord::try_from(row)
    }
}
