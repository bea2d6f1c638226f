use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::application::repos::{CreateUserParams, RepoError, UpdateUserTokenParams, UsersRepo};
use crate::domain::entities::UserRecord;
use crate::domain::types::UserId;

const TOKEN_PREFIX: &str = "op";
const PREFIX_LEN: usize = 12;
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,
    #[error("invalid credentials")]
    Invalid,
    #[error("invalid identity: {0}")]
    InvalidIdentity(&'static str),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Resolves a presented bearer credential to a caller identity.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthError>;
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub user: UserRecord,
    pub token: String,
}

/// Opaque bearer tokens of the form `op_<prefix>_<secret>`.
///
/// Only the SHA-256 of the secret is stored; the prefix locates the account.
#[derive(Clone)]
pub struct TokenAuthenticator {
    users: Arc<dyn UsersRepo>,
}

impl TokenAuthenticator {
    pub fn new(users: Arc<dyn UsersRepo>) -> Self {
        Self { users }
    }

    /// Issue a fresh token for `email`, creating the account on first use.
    /// Any previously issued token for the account stops working.
    pub async fn issue(&self, email: &str, name: &str) -> Result<IssuedToken, AuthError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::InvalidIdentity("email"));
        }

        let user = match self.users.find_by_email(email).await? {
            Some(user) => user,
            None => {
                self.users
                    .create_user(CreateUserParams {
                        email: email.to_string(),
                        name: name.trim().to_string(),
                        picture: String::new(),
                    })
                    .await?
            }
        };

        let prefix = Self::generate_prefix();
        let secret = Self::generate_secret();
        let token = format!("{TOKEN_PREFIX}_{prefix}_{secret}");

        let user = self
            .users
            .update_token(UpdateUserTokenParams {
                id: user.id,
                token_prefix: prefix,
                token_hash: hex::encode(Self::hash_secret(&secret)),
            })
            .await?;

        Ok(IssuedToken { user, token })
    }

    fn hash_secret(secret: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.finalize().to_vec()
    }

    fn generate_prefix() -> String {
        Uuid::new_v4().simple().to_string()[..PREFIX_LEN].to_string()
    }

    fn generate_secret() -> String {
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }

    fn parse_token(token: &str) -> Option<ParsedToken<'_>> {
        let mut parts = token.trim().splitn(3, '_');
        if parts.next()? != TOKEN_PREFIX {
            return None;
        }
        let prefix = parts.next()?;
        let secret = parts.next()?;
        if prefix.is_empty() || secret.len() < MIN_SECRET_LEN {
            return None;
        }
        Some(ParsedToken { prefix, secret })
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::Missing);
        }
        let parsed = Self::parse_token(token).ok_or(AuthError::Invalid)?;

        let record = match self.users.find_by_token_prefix(parsed.prefix).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(AuthError::Invalid),
            Err(err) => {
                warn!(
                    target = "opaline::auth",
                    error = %err,
                    "token lookup failed"
                );
                return Err(AuthError::Invalid);
            }
        };

        let stored = record
            .token_hash
            .as_deref()
            .and_then(|value| hex::decode(value).ok())
            .ok_or(AuthError::Invalid)?;
        let presented = Self::hash_secret(parsed.secret);
        if stored.ct_eq(&presented).unwrap_u8() == 0 {
            return Err(AuthError::Invalid);
        }

        Ok(record.id)
    }
}

struct ParsedToken<'a> {
    prefix: &'a str,
    secret: &'a str,
}
