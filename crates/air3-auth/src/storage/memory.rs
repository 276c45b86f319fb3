//! In-memory profile store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::profile::{CreateOutcome, ProfileStore, UserProfile};
use crate::error::{AuthError, AuthResult};

/// Profile store keeping documents in a map keyed by subject id.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
    operations: AtomicUsize,
}

impl InMemoryProfileStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of trait operations served.
    #[must_use]
    pub fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    /// Number of stored profiles.
    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    /// Returns `true` if no profile is stored.
    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn find_by_subject(&self, subject_id: &str) -> AuthResult<Option<UserProfile>> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        Ok(self.profiles.read().await.get(subject_id).cloned())
    }

    async fn create_profile(&self, profile: &UserProfile) -> AuthResult<CreateOutcome> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if profile.cognito_sub.is_empty() {
            return Err(AuthError::internal("profile has no subject id"));
        }

        let mut profiles = self.profiles.write().await;
        if profiles.contains_key(&profile.cognito_sub) {
            return Ok(CreateOutcome::AlreadyExists);
        }

        let id = Uuid::new_v4().simple().to_string();
        let mut stored = profile.clone();
        stored.id = Some(id.clone());
        profiles.insert(profile.cognito_sub.clone(), stored);

        Ok(CreateOutcome::Created(id))
    }

    async fn set_role(&self, subject_id: &str, role: &str) -> AuthResult<bool> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        let mut profiles = self.profiles.write().await;
        Ok(match profiles.get_mut(subject_id) {
            Some(profile) => {
                profile.role = Some(role.to_string());
                true
            }
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileConfig;
    use tokio_test::block_on;

    fn profile(subject_id: &str) -> UserProfile {
        UserProfile::provisioned(subject_id, None, &ProfileConfig::default())
    }

    #[tokio::test]
    async fn test_find_is_idempotent() {
        let store = InMemoryProfileStore::new();
        store.create_profile(&profile("sub-1")).await.unwrap();

        let first = store.find_by_subject("sub-1").await.unwrap();
        let second = store.find_by_subject("sub-1").await.unwrap();
        assert!(first.is_some());
        assert_eq!(first, second);
        assert!(store.find_by_subject("sub-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create() {
        let store = InMemoryProfileStore::new();
        let outcome = store.create_profile(&profile("sub-1")).await.unwrap();
        assert!(matches!(outcome, CreateOutcome::Created(_)));

        let outcome = store.create_profile(&profile("sub-1")).await.unwrap();
        assert_eq!(outcome, CreateOutcome::AlreadyExists);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_subject_rejected() {
        let store = InMemoryProfileStore::new();
        let err = store.create_profile(&profile("")).await.unwrap_err();
        assert!(matches!(err, AuthError::Internal { .. }));
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_set_role_then_find() {
        let store = InMemoryProfileStore::new();
        block_on(async {
            store.create_profile(&profile("sub-1")).await.unwrap();

            assert!(store.set_role("sub-1", "judge").await.unwrap());
            let found = store.find_by_subject("sub-1").await.unwrap().unwrap();
            assert_eq!(found.role.as_deref(), Some("judge"));

            assert!(!store.set_role("missing", "judge").await.unwrap());
        });
        assert_eq!(store.operations(), 4);
    }
}
