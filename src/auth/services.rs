use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::password::{hash_password, is_legacy_hash, verify_password};
use crate::storage::{Credential, StoreError, UserDirectory};

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^\S{1,64}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Username already exists")]
    UsernameTaken,
    #[error("User not found")]
    UnknownUser,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub async fn register(
    users: &UserDirectory,
    username: &str,
    password: &str,
) -> Result<Credential, AuthError> {
    if users.find(username).await?.is_some() {
        return Err(AuthError::UsernameTaken);
    }
    let password_hash = hash_password(password)?;
    users
        .save_user(username, &password_hash)
        .await?;
    Ok(Credential {
        username: username.to_string(),
        password_hash,
    })
}

/// Checks the password. A record still carrying a legacy hash is rehashed
/// with Argon2 on success.
pub async fn authenticate(
    users: &UserDirectory,
    username: &str,
    password: &str,
) -> Result<Credential, AuthError> {
    let user = users
        .find(username)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !verify_password(password, &user.password_hash)? {
        return Err(AuthError::InvalidCredentials);
    }

    if is_legacy_hash(&user.password_hash) {
        let upgraded = hash_password(password)?;
        match users.save_user(username, &upgraded).await {
            Ok(()) => {
                info!(%username, "upgraded legacy password hash");
                return Ok(Credential {
                    username: user.username,
                    password_hash: upgraded,
                });
            }
            Err(e) => warn!(error = %e, %username, "could not upgrade legacy password hash"),
        }
    }
    Ok(user)
}

pub async fn reset_password(
    users: &UserDirectory,
    username: &str,
    new_password: &str,
) -> Result<(), AuthError> {
    if users.find(username).await?.is_none() {
        return Err(AuthError::UnknownUser);
    }
    let password_hash = hash_password(new_password)?;
    users
        .save_user(username, &password_hash)
        .await?;
    users.clear_current_user_if(username).await?;
    Ok(())
}
