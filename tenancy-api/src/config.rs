/// Configuration management for the API server
///
/// Configuration is read once at startup into an immutable [`Config`] and
/// handed to the components that need it. A `.env` file is honoured for
/// development.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `API_HOST`: host to bind to (default: 0.0.0.0)
/// - `API_PORT`: port to bind to (default: 8080)
/// - `PUBLIC_URL`: base URL used in emailed links (default: `http://{API_HOST}:{API_PORT}`)
/// - `JWT_SECRET`: signing secret, at least 32 bytes (required)
/// - `JWT_ALGORITHM`: HS256, HS384 or HS512 (default: HS256)
/// - `JWT_ACCESS_EXPIRY`: access token lifetime in hours (default: 24, max: 8760)
/// - `JWT_REFRESH_EXPIRY`: refresh token lifetime in days (default: 30, max: 3650)
/// - `EMAIL_KEY` / `EMAIL_USER`: SendGrid API key and sender address; when
///   either is missing, mail is only logged
/// - `INVITE_EXPIRY_MINUTES` (default: 15), `RESET_EXPIRY_MINUTES` (default: 5);
///   at most one week
/// - `LOGIN_ALERTS`: `true` to email users on every login (default: false)
/// - `CORS_ORIGINS`: comma-separated origins (default: `*`)
/// - `PRODUCTION`: `true` behind HTTPS in production (default: false)
///
/// # Example
///
/// ```no_run
/// use tenancy_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::env;
use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use tenancy_shared::auth::jwt::{parse_algorithm, TokenConfig};
use tenancy_shared::identity::IdentityConfig;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub email: EmailConfig,
    pub identity: IdentitySettings,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Externally reachable base URL
    pub public_url: String,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Production mode enables HSTS
    pub production: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Signing secret; generate with `openssl rand -hex 32`
    pub secret: String,

    /// Algorithm name, validated at load
    pub algorithm: String,

    pub access_ttl_hours: i64,
    pub refresh_ttl_days: i64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("access_ttl_hours", &self.access_ttl_hours)
            .field("refresh_ttl_days", &self.refresh_ttl_days)
            .finish()
    }
}

impl JwtConfig {
    /// Builds the token service configuration
    pub fn token_config(&self) -> anyhow::Result<TokenConfig> {
        Ok(TokenConfig {
            secret: self.secret.clone(),
            algorithm: parse_algorithm(&self.algorithm)?,
            access_ttl_hours: self.access_ttl_hours,
            refresh_ttl_days: self.refresh_ttl_days,
        })
    }
}

/// Outbound email configuration
#[derive(Clone, Default)]
pub struct EmailConfig {
    pub api_key: Option<String>,
    pub from: Option<String>,
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("from", &self.from)
            .finish()
    }
}

impl EmailConfig {
    /// API key and sender, when both are configured
    pub fn sendgrid(&self) -> Option<(&str, &str)> {
        match (&self.api_key, &self.from) {
            (Some(key), Some(from)) => Some((key.as_str(), from.as_str())),
            _ => None,
        }
    }
}

/// Identity workflow policy
#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub invite_ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
    pub login_alerts: bool,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}

/// Longest accepted access token lifetime (one year)
const MAX_ACCESS_TTL_HOURS: i64 = 24 * 365;

/// Longest accepted refresh token lifetime (ten years)
const MAX_REFRESH_TTL_DAYS: i64 = 3650;

/// Longest accepted invitation or reset link lifetime (one week)
const MAX_LINK_TTL_MINUTES: i64 = 7 * 24 * 60;

/// Parses a lifetime that must lie in `1..=max`
fn lifetime_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: i64,
    max: i64,
) -> anyhow::Result<i64> {
    let value = parse_or(lookup, key, default)?;
    if !(1..=max).contains(&value) {
        anyhow::bail!("{} must be between 1 and {}, got {}", key, max, value);
    }
    Ok(value)
}

impl Config {
    /// Loads configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or any value fails
    /// to parse or validate.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "API_PORT", 8080u16)?;
        let public_url = lookup("PUBLIC_URL")
            .unwrap_or_else(|| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        let production = parse_or(&lookup, "PRODUCTION", false)?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?;

        let secret = lookup("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;
        if secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let algorithm = lookup("JWT_ALGORITHM").unwrap_or_else(|| "HS256".to_string());
        parse_algorithm(&algorithm).context("JWT_ALGORITHM is not supported")?;

        let access_ttl_hours =
            lifetime_or(&lookup, "JWT_ACCESS_EXPIRY", 24, MAX_ACCESS_TTL_HOURS)?;
        let refresh_ttl_days =
            lifetime_or(&lookup, "JWT_REFRESH_EXPIRY", 30, MAX_REFRESH_TTL_DAYS)?;

        let invite_ttl_minutes =
            lifetime_or(&lookup, "INVITE_EXPIRY_MINUTES", 15, MAX_LINK_TTL_MINUTES)?;
        let reset_ttl_minutes =
            lifetime_or(&lookup, "RESET_EXPIRY_MINUTES", 5, MAX_LINK_TTL_MINUTES)?;
        let login_alerts = parse_or(&lookup, "LOGIN_ALERTS", false)?;

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                public_url,
                cors_origins,
                production,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            jwt: JwtConfig {
                secret,
                algorithm,
                access_ttl_hours,
                refresh_ttl_days,
            },
            email: EmailConfig {
                api_key: lookup("EMAIL_KEY").filter(|v| !v.is_empty()),
                from: lookup("EMAIL_USER").filter(|v| !v.is_empty()),
            },
            identity: IdentitySettings {
                invite_ttl_minutes,
                reset_ttl_minutes,
                login_alerts,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Builds the identity workflow policy
    pub fn identity_config(&self) -> IdentityConfig {
        IdentityConfig {
            public_url: self.api.public_url.clone(),
            invite_ttl_minutes: self.identity.invite_ttl_minutes,
            reset_ttl_minutes: self.identity.reset_ttl_minutes,
            login_alerts: self.identity.login_alerts,
        }
    }
}
