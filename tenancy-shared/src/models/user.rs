/// User model
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(100) NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     profile JSONB NOT NULL DEFAULT '{}',
///     -- audit columns (see models::audit)
/// );
/// ```
///
/// Email matching is exact and case-sensitive. The password hash is produced
/// by [`CredentialStore`](crate::auth::password::CredentialStore) and is
/// never serialized.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::audit::Audit;

/// A user account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID (UUID v4)
    pub id: Uuid,

    /// Email address, unique across all users
    pub email: String,

    /// Argon2id PHC string
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Free-form profile attributes
    pub profile: JsonValue,

    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    /// Email address
    pub email: String,

    /// Argon2id hash (NOT the plaintext password)
    pub password_hash: String,

    /// Profile attributes (defaults to `{}`)
    pub profile: Option<JsonValue>,
}

/// Typed user lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserLookup<'a> {
    ById(Uuid),
    ByEmail(&'a str),
}

impl User {
    /// Whether this user matches a lookup
    pub fn matches(&self, lookup: &UserLookup<'_>) -> bool {
        match lookup {
            UserLookup::ById(id) => self.id == *id,
            UserLookup::ByEmail(email) => self.email == *email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "$argon2id$secret".to_string(),
            profile: serde_json::json!({}),
            audit: Audit::new(),
        }
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let json = serde_json::to_value(user("a@x.com")).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "a@x.com");
        // audit fields are flattened
        assert_eq!(json["status"], 0);
        assert!(json.get("created_at").is_some());
    }

    #[test]
    fn test_email_lookup_is_case_sensitive() {
        let u = user("a@x.com");
        assert!(u.matches(&UserLookup::ByEmail("a@x.com")));
        assert!(!u.matches(&UserLookup::ByEmail("A@x.com")));
        assert!(u.matches(&UserLookup::ById(u.id)));
    }
}
