/// JWT issuance and validation module
///
/// Every token carries an audience from a closed set ([`Audience`]) naming the
/// single workflow allowed to accept it, plus a type tag (access or refresh),
/// issued-at and expiry timestamps. Tokens are signed with one process-wide
/// secret using a symmetric HMAC algorithm chosen by configuration.
///
/// # Token Kinds
///
/// | Use | Audience | Type | Default lifetime |
/// |-----|----------|------|------------------|
/// | Session | `login` | access | `access_ttl_hours` |
/// | Session renewal | `login` | refresh | `refresh_ttl_days` |
/// | Invitation | `invite` | access | 15 minutes (caller override) |
/// | Password reset | `reset` | access | 5 minutes (caller override) |
///
/// # Rejections
///
/// [`TokenService::validate`] never panics and keeps expired, malformed and
/// wrong-audience tokens apart ([`TokenRejection`]), so an expired session
/// token can drive a refresh instead of a fresh login.
///
/// # Example
///
/// ```
/// use tenancy_shared::auth::jwt::{Audience, ClaimSet, TokenConfig, TokenRejection, TokenService};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = TokenService::new(TokenConfig::new("your-secret-key-at-least-32-bytes!!"))?;
/// let user_id = Uuid::new_v4();
///
/// let token = service.issue_access(ClaimSet::for_user(user_id).audience(Audience::Login), None)?;
///
/// let claims = service.validate(&token, Audience::Login)?;
/// assert_eq!(claims.user_id, Some(user_id));
///
/// // Same token, different workflow
/// assert!(matches!(
///     service.validate(&token, Audience::Reset),
///     Err(TokenRejection::AudienceMismatch)
/// ));
/// # Ok(())
/// # }
/// ```

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error type for token issuance and configuration
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Claim set has no audience; no token is produced
    #[error("Audience required to encode token")]
    AudienceRequired,

    /// Configured algorithm is unknown or not a symmetric HMAC algorithm
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Lifetime does not fit in a timestamp
    #[error("Token lifetime is out of range")]
    InvalidLifetime,

    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Presented token was rejected (refresh flow)
    #[error(transparent)]
    Rejected(#[from] TokenRejection),
}

/// Why a presented token was not accepted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenRejection {
    /// Signature and audience are fine but `exp` has passed
    #[error("Token has expired")]
    Expired,

    /// Not decodable, bad signature, wrong algorithm or bad claim shapes
    #[error("Invalid token: {0}")]
    Malformed(String),

    /// Token was issued for a different workflow
    #[error("Token audience does not match")]
    AudienceMismatch,

    /// Access token presented where a refresh token is required, or vice versa
    #[error("Expected {expected} token, got {actual}")]
    WrongType {
        expected: TokenType,
        actual: TokenType,
    },
}

/// Closed set of workflows a token can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    /// Session tokens returned by login
    Login,

    /// Account registration
    Register,

    /// Password reset links
    Reset,

    /// Organisation invitations
    Invite,
}

impl Audience {
    /// Gets the audience as its wire string
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Login => "login",
            Audience::Register => "register",
            Audience::Reset => "reset",
            Audience::Invite => "invite",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Bearer credential or single-purpose link token
    Access,

    /// Long-lived token exchanged for new access tokens
    Refresh,
}

impl TokenType {
    /// Gets token type as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subject references and audience a caller wants signed
///
/// The audience is optional here only so that a missing audience is caught at
/// issuance with [`TokenError::AudienceRequired`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSet {
    pub user_id: Option<Uuid>,
    pub org_id: Option<Uuid>,
    pub role_id: Option<Uuid>,
    pub audience: Option<Audience>,
}

impl ClaimSet {
    /// Starts a claim set bound to a user
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    /// Adds the organisation reference
    pub fn org(mut self, org_id: Uuid) -> Self {
        self.org_id = Some(org_id);
        self
    }

    /// Adds the role reference
    pub fn role(mut self, role_id: Uuid) -> Self {
        self.role_id = Some(role_id);
        self
    }

    /// Sets the audience
    pub fn audience(mut self, audience: Audience) -> Self {
        self.audience = Some(audience);
        self
    }
}

/// Signed claim set as carried inside a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User the token speaks for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,

    /// Organisation (invitation tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<Uuid>,

    /// Role (invitation tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<Uuid>,

    /// Workflow the token is bound to
    pub aud: Audience,

    /// Access or refresh
    #[serde(rename = "type")]
    pub token_type: TokenType,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Checks if the claims have expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// Immutable token signing configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// HMAC secret; should be at least 32 bytes
    pub secret: String,

    /// Signing algorithm (HS256, HS384 or HS512)
    pub algorithm: Algorithm,

    /// Default access token lifetime in hours
    pub access_ttl_hours: i64,

    /// Default refresh token lifetime in days
    pub refresh_ttl_days: i64,
}

impl TokenConfig {
    /// HS256 config with 24 hour access and 30 day refresh lifetimes
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            algorithm: Algorithm::HS256,
            access_ttl_hours: 24,
            refresh_ttl_days: 30,
        }
    }
}

/// Parses a configured algorithm identifier, allowing only HMAC algorithms
///
/// ```
/// use tenancy_shared::auth::jwt::parse_algorithm;
///
/// assert!(parse_algorithm("HS512").is_ok());
/// assert!(parse_algorithm("RS256").is_err());
/// assert!(parse_algorithm("none").is_err());
/// ```
pub fn parse_algorithm(name: &str) -> Result<Algorithm, TokenError> {
    let algorithm = Algorithm::from_str(name)
        .map_err(|_| TokenError::UnsupportedAlgorithm(name.to_string()))?;

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        _ => Err(TokenError::UnsupportedAlgorithm(name.to_string())),
    }
}

/// Issues and validates audience-bound tokens
#[derive(Clone)]
pub struct TokenService {
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &self.config.algorithm)
            .field("access_ttl_hours", &self.config.access_ttl_hours)
            .field("refresh_ttl_days", &self.config.refresh_ttl_days)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Builds the service from its configuration
    ///
    /// # Errors
    ///
    /// Returns `TokenError::UnsupportedAlgorithm` for non-HMAC algorithms.
    pub fn new(config: TokenConfig) -> Result<Self, TokenError> {
        if !matches!(
            config.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(TokenError::UnsupportedAlgorithm(format!("{:?}", config.algorithm)));
        }

        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Ok(Self {
            config,
            encoding_key,
            decoding_key,
        })
    }

    /// Issues an access token
    ///
    /// Lifetime is `access_ttl_hours` unless `ttl_override_minutes` is given,
    /// in which case the override (in minutes) wins.
    ///
    /// # Errors
    ///
    /// - `TokenError::AudienceRequired` if the claim set has no audience
    /// - `TokenError::InvalidLifetime` if the lifetime overflows
    pub fn issue_access(
        &self,
        claims: ClaimSet,
        ttl_override_minutes: Option<i64>,
    ) -> Result<String, TokenError> {
        let ttl = match ttl_override_minutes {
            Some(minutes) => Duration::try_minutes(minutes),
            None => Duration::try_hours(self.config.access_ttl_hours),
        }
        .ok_or(TokenError::InvalidLifetime)?;

        self.issue(claims, TokenType::Access, ttl)
    }

    /// Issues a refresh token valid for `refresh_ttl_days`
    ///
    /// # Errors
    ///
    /// - `TokenError::AudienceRequired` if the claim set has no audience
    /// - `TokenError::InvalidLifetime` if the lifetime overflows
    pub fn issue_refresh(&self, claims: ClaimSet) -> Result<String, TokenError> {
        let ttl = Duration::try_days(self.config.refresh_ttl_days)
            .ok_or(TokenError::InvalidLifetime)?;

        self.issue(claims, TokenType::Refresh, ttl)
    }

    fn issue(
        &self,
        claims: ClaimSet,
        token_type: TokenType,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let aud = claims.audience.ok_or(TokenError::AudienceRequired)?;

        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(TokenError::InvalidLifetime)?;

        let signed = Claims {
            user_id: claims.user_id,
            org_id: claims.org_id,
            role_id: claims.role_id,
            aud,
            token_type,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(self.config.algorithm), &signed, &self.encoding_key)
            .map_err(|e| TokenError::CreateError(format!("Token encoding failed: {}", e)))
    }

    /// Validates a token for the given audience
    ///
    /// Checks signature, algorithm, exact audience match and expiry (no
    /// leeway). Does not look at the token type.
    pub fn validate(&self, token: &str, expected: Audience) -> Result<Claims, TokenRejection> {
        let mut validation = Validation::new(self.config.algorithm);
        validation.set_audience(&[expected.as_str()]);
        validation.validate_exp = true;
        validation.leeway = 0;

        let token_data =
            decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenRejection::Expired,
                    jsonwebtoken::errors::ErrorKind::InvalidAudience => {
                        TokenRejection::AudienceMismatch
                    }
                    _ => TokenRejection::Malformed(e.to_string()),
                }
            })?;

        Ok(token_data.claims)
    }

    /// Validates a token and also requires a specific token type
    pub fn validate_typed(
        &self,
        token: &str,
        expected: Audience,
        token_type: TokenType,
    ) -> Result<Claims, TokenRejection> {
        let claims = self.validate(token, expected)?;

        if claims.token_type != token_type {
            return Err(TokenRejection::WrongType {
                expected: token_type,
                actual: claims.token_type,
            });
        }

        Ok(claims)
    }

    /// Exchanges a `login` refresh token for a new `login` access token
    ///
    /// # Errors
    ///
    /// `TokenError::Rejected` if the refresh token is invalid, expired, bound
    /// to another audience, or is an access token.
    pub fn refresh_access(&self, refresh_token: &str) -> Result<String, TokenError> {
        let claims = self.validate_typed(refresh_token, Audience::Login, TokenType::Refresh)?;

        let user_id = claims
            .user_id
            .ok_or_else(|| TokenRejection::Malformed("refresh token has no user_id".to_string()))?;

        self.issue_access(ClaimSet::for_user(user_id).audience(Audience::Login), None)
    }
}
