//! Password hashing.
//!
//! bcrypt with the `$2y$` prefix so hashes written by the PHP tenant apps
//! verify unchanged.

use bcrypt::Version;

use crate::error::AuthError;

/// Hash a password with the given bcrypt cost.
///
/// CPU bound; async callers should run it on the blocking pool.
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash_with_result(password, cost)
        .map(|parts| parts.format_for_version(Version::TwoY))
        .map_err(|e| AuthError::Infrastructure(format!("password hashing failed: {e}")))
}

/// Check a password against a stored hash.
///
/// A malformed stored hash is an infrastructure fault, not a credential
/// mismatch.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash)
        .map_err(|e| AuthError::Infrastructure(format!("password verification failed: {e}")))
}

/// Run [`hash_password`] off the async executor.
pub async fn hash_password_blocking(password: String, cost: u32) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| AuthError::Infrastructure(format!("hashing task failed: {e}")))?
}

/// Run [`verify_password`] off the async executor.
pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::Infrastructure(format!("verification task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("secret-password", 4).unwrap();
        assert!(hash.starts_with("$2y$04$"));
        assert!(verify_password("secret-password", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn verifies_2b_hashes() {
        let parts = bcrypt::hash_with_result("pw123456", 4).unwrap();
        let hash = parts.format_for_version(Version::TwoB);
        assert!(verify_password("pw123456", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_infrastructure_error() {
        let err = verify_password("pw", "not-a-hash").unwrap_err();
        assert!(matches!(err, AuthError::Infrastructure(_)));
    }
}
