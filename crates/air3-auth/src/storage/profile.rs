//! User profile documents and the profile store interface.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::config::ProfileConfig;
use crate::error::AuthResult;

/// Schema version written to new profiles.
pub const PROFILE_VERSION: f64 = 0.5;

/// Sign-in type recorded on profiles provisioned through Air3.
pub const SIGN_IN_TYPE_AIR3: &str = "air3";

/// Status of a freshly provisioned profile.
pub const PROFILE_STATUS_NEW: &str = "new";

const DEFAULT_BIOGRAPHY: &str = "No bio yet";
const USERNAME_PREFIX: &str = "username_";
const USERNAME_SUBJECT_CHARS: usize = 5;

/// Persisted user profile, keyed by the identity provider subject id.
///
/// Field names match the stored document (`cognitoSub`, `air3Role`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Store-assigned document id. Not part of the serialized document.
    #[serde(skip)]
    pub id: Option<String>,

    /// Identity provider subject id. Unique.
    pub cognito_sub: String,

    /// Generated public handle.
    pub username: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub stagename: Option<String>,

    #[serde(default)]
    pub profile_image_url: Option<String>,

    #[serde(default)]
    pub phone_number: Option<String>,

    #[serde(default)]
    pub pronouns: Option<String>,

    #[serde(default)]
    pub town: Option<String>,

    #[serde(default)]
    pub country: Option<String>,

    #[serde(default)]
    pub locale: Option<String>,

    #[serde(default)]
    pub content: Vec<serde_json::Value>,

    #[serde(default)]
    pub contests: Vec<serde_json::Value>,

    #[serde(default, deserialize_with = "lenient_i64")]
    pub wins: i64,

    #[serde(default, deserialize_with = "lenient_i64")]
    pub followers_count: i64,

    #[serde(default, deserialize_with = "lenient_i64")]
    pub following_count: i64,

    #[serde(default)]
    pub verified: bool,

    /// Creation time, milliseconds since the Unix epoch.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub created_at: i64,

    #[serde(default)]
    pub version: f64,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub sign_in_type: String,

    #[serde(default)]
    pub biography: Option<String>,

    /// Assigned Air3 role, if any.
    #[serde(rename = "air3Role", default)]
    pub role: Option<String>,
}

/// Accepts integers stored as doubles by other writers of the collection.
fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Int(i64),
        Float(f64),
    }

    Ok(match Option::<Number>::deserialize(deserializer)? {
        None => 0,
        Some(Number::Int(n)) => n,
        Some(Number::Float(f)) => f as i64,
    })
}

/// Derives the default username for a subject id.
///
/// `"username_"` followed by the first five characters of the subject id, or
/// the whole id when it is shorter.
#[must_use]
pub fn derive_username(subject_id: &str) -> String {
    let prefix: String = subject_id.chars().take(USERNAME_SUBJECT_CHARS).collect();
    format!("{USERNAME_PREFIX}{prefix}")
}

impl UserProfile {
    /// Builds the document for a newly provisioned user.
    #[must_use]
    pub fn provisioned(subject_id: &str, email: Option<String>, config: &ProfileConfig) -> Self {
        let created_at = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;

        Self {
            id: None,
            cognito_sub: subject_id.to_string(),
            username: derive_username(subject_id),
            email,
            name: None,
            stagename: None,
            profile_image_url: Some(config.default_avatar_url()),
            phone_number: None,
            pronouns: None,
            town: None,
            country: None,
            locale: None,
            content: Vec::new(),
            contests: Vec::new(),
            wins: 0,
            followers_count: 0,
            following_count: 0,
            verified: false,
            created_at,
            version: PROFILE_VERSION,
            status: PROFILE_STATUS_NEW.to_string(),
            sign_in_type: SIGN_IN_TYPE_AIR3.to_string(),
            biography: Some(DEFAULT_BIOGRAPHY.to_string()),
            role: None,
        }
    }

    /// Returns `true` if a role has been assigned.
    #[must_use]
    pub fn has_role(&self) -> bool {
        self.role.as_deref().is_some_and(|r| !r.is_empty())
    }
}

/// Outcome of [`ProfileStore::create_profile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new document was inserted with this id.
    Created(String),
    /// A profile for the subject already exists.
    AlreadyExists,
}

/// Storage operations for user profiles.
///
/// Implementations log and map their infrastructure errors to
/// `AuthError::Storage`; driver errors never cross this trait.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Finds the profile for a subject id.
    ///
    /// Returns `None` if no profile exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_subject(&self, subject_id: &str) -> AuthResult<Option<UserProfile>>;

    /// Inserts `profile` unless one already exists for its subject id.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the subject id is empty, or a storage
    /// error if the insert fails for another reason.
    async fn create_profile(&self, profile: &UserProfile) -> AuthResult<CreateOutcome>;

    /// Sets the role on the profile for `subject_id`.
    ///
    /// Returns whether a profile matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn set_role(&self, subject_id: &str, role: &str) -> AuthResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_derive_username() {
        assert_eq!(derive_username("abc"), "username_abc");
        assert_eq!(derive_username("abcdef12"), "username_abcde");
        assert_eq!(derive_username("abcde"), "username_abcde");
        assert_eq!(derive_username(""), "username_");
    }

    #[test]
    fn test_provisioned_defaults() {
        let config = ProfileConfig {
            public_api_url: "https://api.example.com".to_string(),
        };
        let profile = UserProfile::provisioned("f00dbabe-1", Some("a@b.c".to_string()), &config);

        assert_eq!(profile.cognito_sub, "f00dbabe-1");
        assert_eq!(profile.username, "username_f00db");
        assert_eq!(
            profile.profile_image_url.as_deref(),
            Some("https://api.example.com/dev/images/user.jpg")
        );
        assert_eq!(profile.status, "new");
        assert_eq!(profile.sign_in_type, "air3");
        assert_eq!(profile.biography.as_deref(), Some("No bio yet"));
        assert_eq!(profile.version, 0.5);
        assert!(!profile.verified);
        assert!(!profile.has_role());
        assert!(profile.created_at > 1_600_000_000_000);
    }

    #[test]
    fn test_document_field_names() {
        let profile = UserProfile::provisioned("abc", None, &ProfileConfig::default());
        let doc = serde_json::to_value(&profile).unwrap();

        assert_eq!(doc["cognitoSub"], "abc");
        assert_eq!(doc["followersCount"], 0);
        assert_eq!(doc["signInType"], "air3");
        assert_eq!(doc["air3Role"], serde_json::Value::Null);
        assert_eq!(doc["email"], serde_json::Value::Null);
        assert!(doc.get("id").is_none());
    }

    #[test]
    fn test_reads_legacy_numbers() {
        let profile: UserProfile = serde_json::from_value(json!({
            "cognitoSub": "abc",
            "username": "username_abc",
            "createdAt": 1700000000123.0,
            "wins": 3,
            "air3Role": "judge"
        }))
        .unwrap();

        assert_eq!(profile.created_at, 1_700_000_000_123);
        assert_eq!(profile.wins, 3);
        assert_eq!(profile.followers_count, 0);
        assert!(profile.has_role());
    }
}
