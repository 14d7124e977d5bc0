/// Password hashing module using Argon2id
///
/// The [`CredentialStore`] turns raw passwords into salted PHC strings and
/// verifies raw passwords against them. It owns no state beyond its cost
/// parameters, which are fixed at construction.
///
/// # Security
///
/// - **Algorithm**: Argon2id (hybrid of Argon2i and Argon2d)
/// - **Memory**: 64 MB (65536 KB) by default
/// - **Iterations**: 3 passes by default
/// - **Parallelism**: 4 lanes by default
/// - **Output**: 32-byte hash
///
/// Verification reads the parameters embedded in the stored hash, so hashes
/// produced under older cost settings keep verifying after a config change.
///
/// # Example
///
/// ```
/// use tenancy_shared::auth::password::{CredentialStore, PasswordConfig};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = CredentialStore::new(PasswordConfig::default());
/// let hash = store.hash("super_secret_password_123")?;
///
/// assert!(store.verify("super_secret_password_123", &hash)?);
/// assert!(!store.verify("wrong_password", &hash)?);
/// # Ok(())
/// # }
/// ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder, Version,
};

/// Error type for password hashing operations
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// Failed to hash password
    #[error("Failed to hash password: {0}")]
    HashError(String),

    /// Failed to verify password
    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    /// Stored hash is not a valid PHC string
    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    pub memory_kib: u32,

    /// Number of passes
    pub iterations: u32,

    /// Degree of parallelism (lanes)
    pub parallelism: u32,

    /// Hash output length in bytes
    pub output_len: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 4,
            output_len: 32,
        }
    }
}

/// Salted one-way password transform and verifier
#[derive(Debug, Clone)]
pub struct CredentialStore {
    config: PasswordConfig,
}

impl CredentialStore {
    /// Creates a credential store with the given cost parameters
    pub fn new(config: PasswordConfig) -> Self {
        Self { config }
    }

    /// Returns the configured cost parameters
    pub fn config(&self) -> &PasswordConfig {
        &self.config
    }

    /// Hashes a password using Argon2id with a fresh random salt
    ///
    /// Returns a PHC string, e.g.
    /// ```text
    /// $argon2id$v=19$m=65536,t=3,p=4$c2FsdHNhbHRzYWx0$hash...
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `PasswordError::HashError` if the parameters are invalid or
    /// hashing fails.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        let params = ParamsBuilder::new()
            .m_cost(self.config.memory_kib)
            .t_cost(self.config.iterations)
            .p_cost(self.config.parallelism)
            .output_len(self.config.output_len)
            .build()
            .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordError::HashError(format!("Hash generation failed: {}", e)))?;

        Ok(password_hash.to_string())
    }

    /// Verifies a password against a stored hash
    ///
    /// Comparison is constant-time. A well-formed hash never produces an
    /// error for a wrong password, only `Ok(false)`.
    ///
    /// # Errors
    ///
    /// - `PasswordError::InvalidHash` if `hash` is not a PHC string
    /// - `PasswordError::VerifyError` for any other verification failure
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| PasswordError::InvalidHash(format!("Failed to parse hash: {}", e)))?;

        // Parameters come from the PHC string, not from self.config
        let argon2 = Argon2::default();

        match argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::VerifyError(format!("Verification failed: {}", e))),
        }
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(PasswordConfig::default())
    }
}
