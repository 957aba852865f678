use bcrypt::{hash, verify, DEFAULT_COST};
use tracing::debug;

use crate::error::{Result, StorefrontError};

/// One-way password hashing with bcrypt
///
/// Every digest carries its own random salt, so hashing the same password
/// twice yields different digests that both verify.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        hash(password, self.cost).map_err(|e| StorefrontError::internal(format!("password hashing failed: {}", e)))
    }

    /// Constant-time check of `password` against `digest`. A malformed digest
    /// is a mismatch, never an error.
    pub fn verify(&self, password: &str, digest: &str) -> bool {
        match verify(password, digest) {
            Ok(valid) => valid,
            Err(e) => {
                debug!("Rejecting unverifiable password digest: {}", e);
                false
            }
        }
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_COST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Lowest cost bcrypt accepts, keeps the tests fast.
    fn hasher() -> PasswordHasher {
        PasswordHasher::new(4)
    }

    #[test]
    fn test_hash_then_verify() {
        let h = hasher();
        let digest = h.hash("s3cret-pass").unwrap();

        assert_ne!(digest, "s3cret-pass");
        assert!(h.verify("s3cret-pass", &digest));
        assert!(!h.verify("s3cret-pasS", &digest));
        assert!(!h.verify("", &digest));
    }

    #[test]
    fn test_salted_digests_differ() {
        let h = hasher();
        let a = h.hash("same").unwrap();
        let b = h.hash("same").unwrap();

        assert_ne!(a, b);
        assert!(h.verify("same", &a));
        assert!(h.verify("same", &b));
    }

    #[test]
    fn test_malformed_digest_is_a_mismatch() {
        let h = hasher();
        assert!(!h.verify("anything", "not-a-bcrypt-digest"));
        assert!(!h.verify("anything", ""));
    }

    #[test]
    fn test_invalid_cost_is_an_error() {
        let h = PasswordHasher::new(1);
        assert!(matches!(h.hash("pw"), Err(StorefrontError::Internal(_))));
    }
}
