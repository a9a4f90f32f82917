use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use std::fmt;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug)]
pub enum PasswordError {
    Hash(argon2::password_hash::Error),
    Task(tokio::task::JoinError),
}

impl fmt::Display for PasswordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordError::Hash(e) => write!(f, "password hashing failed: {e}"),
            PasswordError::Task(e) => write!(f, "password task failed: {e}"),
        }
    }
}

impl std::error::Error for PasswordError {}

impl From<argon2::password_hash::Error> for PasswordError {
    fn from(e: argon2::password_hash::Error) -> Self {
        PasswordError::Hash(e)
    }
}

impl From<tokio::task::JoinError> for PasswordError {
    fn from(e: tokio::task::JoinError) -> Self {
        PasswordError::Task(e)
    }
}

/// Argon2id PHC string for `password` with a fresh random salt.
///
/// Runs on the blocking pool so request workers are not held up.
pub async fn hash_password(password: String) -> Result<String, PasswordError> {
    let hash = tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
    })
    .await??;
    Ok(hash)
}

/// False for a wrong password. Errors only when the stored hash is unusable.
pub async fn verify_password(password: String, hash: String) -> Result<bool, PasswordError> {
    let verified = tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash)?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e),
        }
    })
    .await??;
    Ok(verified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let hash = hash_password("correct horse".to_string()).await.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong horse".to_string(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn same_password_gets_different_salts() {
        let a = hash_password("password1".to_string()).await.unwrap();
        let b = hash_password("password1".to_string()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn garbage_hash_is_an_error() {
        assert!(verify_password("x".to_string(), "not a hash".to_string()).await.is_err());
    }
}
