use bcrypt::DEFAULT_COST;

use crate::errors::{AppError, Result};

/// bcrypt hashing off the async runtime threads.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl PasswordHasher {
    pub fn with_cost(cost: u32) -> Self {
        Self { cost }
    }

    pub async fn hash(&self, password: &str) -> Result<String> {
        let password = password.to_owned();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AppError::internal(format!("hashing task failed: {}", e)))?
            .map_err(AppError::from)
    }

    /// A malformed stored hash counts as a mismatch.
    pub async fn verify(&self, password: &str, hashed: &str) -> Result<bool> {
        let password = password.to_owned();
        let hashed = hashed.to_owned();
        let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hashed))
            .await
            .map_err(|e| AppError::internal(format!("hashing task failed: {}", e)))?;
        Ok(verified.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWORD: &str = "Password123!";

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hasher = PasswordHasher::with_cost(4);
        let hashed = hasher.hash(PASSWORD).await.unwrap();
        assert_ne!(hashed, PASSWORD);
        assert!(hasher.verify(PASSWORD, &hashed).await.unwrap());
        assert!(!hasher.verify("wrong", &hashed).await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_hash_is_mismatch() {
        let hasher = PasswordHasher::with_cost(4);
        assert!(!hasher.verify(PASSWORD, "not-a-bcrypt-hash").await.unwrap());
    }
}
