//! Password hashing: bcrypt over the peppered password. bcrypt ignores
//! input beyond 72 bytes, so the pepper goes in front of the password where
//! it always participates.

use crate::error::{Error, Result};

pub fn hash_password(password: &str, pepper: &str) -> Result<String> {
    let peppered = format!("{pepper}{password}");
    bcrypt::hash(peppered, bcrypt::DEFAULT_COST)
        .map_err(|e| Error::Terminal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, pepper: &str, hash: &str) -> Result<bool> {
    let peppered = format!("{pepper}{password}");
    bcrypt::verify(peppered, hash)
        .map_err(|e| Error::Terminal(format!("password verification failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low cost keeps the test fast; production uses DEFAULT_COST.
    fn hash_fast(password: &str, pepper: &str) -> String {
        bcrypt::hash(format!("{pepper}{password}"), 4).unwrap()
    }

    #[test]
    fn verification_requires_the_same_pepper() {
        let hash = hash_fast("hunter2", "pepper-a");
        assert!(verify_password("hunter2", "pepper-a", &hash).unwrap());
        assert!(!verify_password("hunter2", "pepper-b", &hash).unwrap());
        assert!(!verify_password("hunter3", "pepper-a", &hash).unwrap());
    }
}
