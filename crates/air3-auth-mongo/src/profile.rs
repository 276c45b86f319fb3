//! `ProfileStore` implementation over the profile collection.

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use air3_auth::error::{AuthError, AuthResult};
use air3_auth::storage::{CreateOutcome, ProfileStore, UserProfile};

use crate::{MongoProfileStore, StorageError, is_duplicate_key};

/// Field holding the identity provider subject id.
pub const SUBJECT_FIELD: &str = "cognitoSub";

/// Field holding the assigned role.
pub const ROLE_FIELD: &str = "air3Role";

/// Stored form of a [`UserProfile`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDocument {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(flatten)]
    pub profile: UserProfile,
}

impl ProfileDocument {
    /// Wraps a profile for insertion; the server assigns the id.
    #[must_use]
    pub fn for_insert(profile: &UserProfile) -> Self {
        Self {
            id: None,
            profile: profile.clone(),
        }
    }

    /// Converts to the domain type, carrying the document id.
    #[must_use]
    pub fn into_profile(self) -> UserProfile {
        let mut profile = self.profile;
        profile.id = self.id.map(|id| id.to_hex());
        profile
    }
}

fn to_auth_error(operation: &str, err: impl Into<StorageError>) -> AuthError {
    match err.into() {
        StorageError::InvalidInput(message) => AuthError::internal(message),
        err => {
            tracing::error!(operation, error = %err, "Profile storage operation failed");
            AuthError::storage(format!("{operation} failed"))
        }
    }
}

#[async_trait]
impl ProfileStore for MongoProfileStore {
    async fn find_by_subject(&self, subject_id: &str) -> AuthResult<Option<UserProfile>> {
        let found = self
            .collection()
            .find_one(doc! { SUBJECT_FIELD: subject_id })
            .await
            .map_err(|e| to_auth_error("find profile", e))?;

        Ok(found.map(ProfileDocument::into_profile))
    }

    async fn create_profile(&self, profile: &UserProfile) -> AuthResult<CreateOutcome> {
        if profile.cognito_sub.trim().is_empty() {
            return Err(to_auth_error(
                "insert profile",
                StorageError::invalid_input("profile has no subject id"),
            ));
        }

        let document = ProfileDocument::for_insert(profile);
        match self.collection().insert_one(&document).await {
            Ok(result) => {
                let id = match result.inserted_id.as_object_id() {
                    Some(oid) => oid.to_hex(),
                    None => result.inserted_id.to_string(),
                };
                tracing::debug!(subject = %profile.cognito_sub, id, "Inserted profile");
                Ok(CreateOutcome::Created(id))
            }
            Err(e) if is_duplicate_key(&e) => {
                tracing::debug!(subject = %profile.cognito_sub, "Profile already exists");
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(to_auth_error("insert profile", e)),
        }
    }

    async fn set_role(&self, subject_id: &str, role: &str) -> AuthResult<bool> {
        let result = self
            .collection()
            .update_one(
                doc! { SUBJECT_FIELD: subject_id },
                doc! { "$set": { ROLE_FIELD: role } },
            )
            .await
            .map_err(|e| to_auth_error("set role", e))?;

        Ok(result.matched_count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use air3_auth::config::ProfileConfig;
    use mongodb::bson::{self, Bson};

    #[test]
    fn test_insert_document_has_no_id() {
        let profile = UserProfile::provisioned("abcdef12", None, &ProfileConfig::default());
        let document = bson::to_document(&ProfileDocument::for_insert(&profile)).unwrap();

        assert!(!document.contains_key("_id"));
        assert_eq!(document.get_str(SUBJECT_FIELD).unwrap(), "abcdef12");
        assert_eq!(document.get_str("username").unwrap(), "username_abcde");
        assert_eq!(document.get(ROLE_FIELD), Some(&Bson::Null));
        assert_eq!(document.get_f64("version").unwrap(), 0.5);
        assert!(document.get_i64("createdAt").unwrap() > 0);
    }

    #[test]
    fn test_reads_document_written_elsewhere() {
        let oid = ObjectId::new();
        let document = doc! {
            "_id": oid,
            "cognitoSub": "sub-1",
            "username": "username_sub-1",
            "email": "a@example.com",
            "wins": 2_i32,
            "followersCount": 5.0,
            "createdAt": 1_700_000_000_123.0,
            "status": "new",
            "air3Role": "judge",
        };

        let parsed: ProfileDocument = bson::from_document(document).unwrap();
        let profile = parsed.into_profile();

        assert_eq!(profile.id, Some(oid.to_hex()));
        assert_eq!(profile.cognito_sub, "sub-1");
        assert_eq!(profile.wins, 2);
        assert_eq!(profile.followers_count, 5);
        assert_eq!(profile.created_at, 1_700_000_000_123);
        assert_eq!(profile.role.as_deref(), Some("judge"));
    }
}
