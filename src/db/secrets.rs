use crate::error::{AppError, Result};
use crate::models::Secret;

use super::Repository;

/// Read-only accessor for provider credentials. Every lookup hits the store.
#[derive(Clone)]
pub struct SecretRepository {
    repo: Repository,
}

impl SecretRepository {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub async fn get(&self, filter: &str) -> Result<Secret> {
        self.repo
            .find_secret(filter)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("secret matching {filter}")))
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Secret> {
        self.get(&format!("name = '{}'", name.replace('\'', "\\'")))
            .await
    }

    /// Like [`get_by_name`](Self::get_by_name) but treats a missing or
    /// unreadable secret as absent.
    pub async fn lookup(&self, name: &str) -> Option<Secret> {
        match self.get_by_name(name).await {
            Ok(secret) => Some(secret),
            Err(AppError::NotFound(_)) => None,
            Err(e) => {
                tracing::warn!("Failed to read secret {}: {}", name, e);
                None
            }
        }
    }
}
