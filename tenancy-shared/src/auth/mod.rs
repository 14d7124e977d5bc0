/// Authentication primitives
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and verification (credential store)
/// - [`jwt`]: Audience-bound JWT issuance and validation
///
/// Both components are built from immutable configuration values at startup
/// and hold no other state.
///
/// # Example
///
/// ```
/// use tenancy_shared::auth::jwt::{Audience, ClaimSet, TokenConfig, TokenService};
/// use tenancy_shared::auth::password::{CredentialStore, PasswordConfig};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let credentials = CredentialStore::new(PasswordConfig::default());
/// let hash = credentials.hash("user_password")?;
/// assert!(credentials.verify("user_password", &hash)?);
///
/// let tokens = TokenService::new(TokenConfig::new("a-secret-of-at-least-32-bytes-long!!"))?;
/// let token = tokens.issue_access(ClaimSet::for_user(Uuid::new_v4()).audience(Audience::Login), None)?;
/// assert!(tokens.validate(&token, Audience::Login).is_ok());
/// # Ok(())
/// # }
/// ```

pub mod jwt;
pub mod password;
