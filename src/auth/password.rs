//! bcrypt password hashing. Hashing is CPU-bound, so the async wrappers run
//! it on the blocking pool.

use thiserror::Error;

pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Password hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, PasswordError> {
    Ok(bcrypt::hash(password, cost)?)
}

/// A hash that does not parse counts as a mismatch
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

pub async fn hash_password_blocking(password: String, cost: u32) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password(&password, cost)).await?
}

pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool, PasswordError> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await?)
}
