/// Identity workflows
///
/// [`IdentityService`] is the only component that combines credentials,
/// tokens, the membership model and notifications. Each workflow opens its
/// own unit of work and commits it only once every step, including any
/// required notification, has succeeded. An early return drops the unit of
/// work, which discards its writes.
///
/// # Workflows
///
/// | Workflow | Token audience | Notification |
/// | --- | --- | --- |
/// | [`register`](IdentityService::register) | issues `invite` | required |
/// | [`login`](IdentityService::login) | issues `login` | best-effort alert |
/// | [`refresh`](IdentityService::refresh) | consumes `login` refresh | none |
/// | [`forgot_password`](IdentityService::forgot_password) | issues `reset` | required |
/// | [`reset_password`](IdentityService::reset_password) | consumes `reset` | none |
/// | [`accept_invite`](IdentityService::accept_invite) | consumes `invite` | none |
/// | [`update_member_role`](IdentityService::update_member_role) | none | none |
/// | [`remove_member`](IdentityService::remove_member) | none | none |

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::jwt::{Audience, ClaimSet, TokenError, TokenRejection, TokenService, TokenType};
use crate::auth::password::{CredentialStore, PasswordError};
use crate::membership;
use crate::models::{CreateUser, Member, Organisation, Role, User, UserLookup};
use crate::notify::{NotifyError, Notifier};
use crate::store::{Store, StoreError, UnitOfWork};

/// Workflow policy settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    /// Externally reachable base URL used in emailed links
    pub public_url: String,

    /// Lifetime of invitation tokens
    pub invite_ttl_minutes: i64,

    /// Lifetime of password reset tokens
    pub reset_ttl_minutes: i64,

    /// Send an informational email on every successful login
    pub login_alerts: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:8080".to_string(),
            invite_ttl_minutes: 15,
            reset_ttl_minutes: 5,
            login_alerts: false,
        }
    }
}

/// Error type for identity workflows
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Input rejected before any work was done
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("A user with this email already exists")]
    DuplicateEmail,

    /// Unknown email or wrong password; the two are not distinguished
    #[error("Invalid email or password")]
    AuthenticationFailure,

    #[error("{0}")]
    InvalidToken(TokenRejection),

    /// Token verified but lacks ids the workflow needs
    #[error("Token is missing required claims")]
    MissingClaims,

    #[error("{0} not found")]
    NotFound(String),

    #[error("User does not exist")]
    UserNotFound,

    #[error("Role not found")]
    RoleNotFound,

    #[error("Member not found")]
    MemberNotFound,

    #[error("Not authorized to perform this action")]
    NotAuthorized,

    #[error("Failed to dispatch notification: {0}")]
    NotificationDispatch(#[from] NotifyError),

    /// Persistence or unexpected internal failure
    #[error("Internal error: {0}")]
    System(String),
}

impl From<StoreError> for IdentityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingReference(what) => IdentityError::NotFound(what.to_string()),
            other => IdentityError::System(other.to_string()),
        }
    }
}

impl From<PasswordError> for IdentityError {
    fn from(err: PasswordError) -> Self {
        IdentityError::System(err.to_string())
    }
}

impl From<TokenRejection> for IdentityError {
    fn from(rejection: TokenRejection) -> Self {
        IdentityError::InvalidToken(rejection)
    }
}

impl From<TokenError> for IdentityError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Rejected(rejection) => IdentityError::InvalidToken(rejection),
            other => IdentityError::System(other.to_string()),
        }
    }
}

pub type IdentityResult<T> = Result<T, IdentityError>;

/// Everything created by a registration
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    #[serde(flatten)]
    pub user: User,
    pub organisation: Organisation,
    pub role: Role,
    #[serde(skip)]
    pub invite_token: String,
}

/// Tokens returned by a successful login
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Token handed out by forgot-password
#[derive(Debug, Clone, Serialize)]
pub struct ResetToken {
    pub token: String,
}

/// Coordinates credentials, tokens, membership and notifications
#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    credentials: CredentialStore,
    tokens: TokenService,
    config: IdentityConfig,
}

impl IdentityService {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        credentials: CredentialStore,
        tokens: TokenService,
        config: IdentityConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            credentials,
            tokens,
            config,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    fn invite_url(&self, token: &str) -> String {
        format!(
            "{}/v1/members/invite/{}",
            self.config.public_url.trim_end_matches('/'),
            token
        )
    }

    fn reset_url(&self, token: &str) -> String {
        format!(
            "{}/v1/users/reset-password/{}",
            self.config.public_url.trim_end_matches('/'),
            token
        )
    }

    async fn begin(&self) -> IdentityResult<Box<dyn UnitOfWork>> {
        Ok(self.store.begin().await?)
    }

    /// Registers a user and invites them into an organisation with a role
    ///
    /// The organisation and role are created if they do not exist yet. No
    /// member row is created here; that happens when the emailed invitation
    /// is accepted.
    ///
    /// # Errors
    ///
    /// - `DuplicateEmail` if the email is taken
    /// - `NotificationDispatch` if the invitation email fails; nothing is
    ///   persisted in that case
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        org_name: &str,
        role_name: &str,
        description: Option<&str>,
    ) -> IdentityResult<Registration> {
        for (field, value) in [("email", email), ("org_name", org_name), ("role", role_name)] {
            if value.trim().is_empty() {
                return Err(IdentityError::Validation(format!("{} must not be empty", field)));
            }
        }

        let mut uow = self.begin().await?;

        if uow.find_user(UserLookup::ByEmail(email)).await?.is_some() {
            return Err(IdentityError::DuplicateEmail);
        }

        let password_hash = self.credentials.hash(password)?;
        let user = uow
            .insert_user(CreateUser {
                email: email.to_string(),
                password_hash,
                profile: None,
            })
            .await?
            .ok_or(IdentityError::DuplicateEmail)?;

        let organisation =
            membership::get_or_create_organisation(uow.as_mut(), org_name, false).await?;
        let role =
            membership::get_or_create_role(uow.as_mut(), role_name, organisation.id, description)
                .await?;

        let invite_token = self.tokens.issue_access(
            ClaimSet::for_user(user.id)
                .org(organisation.id)
                .role(role.id)
                .audience(Audience::Invite),
            Some(self.config.invite_ttl_minutes),
        )?;

        let body = format!(
            "You have been invited to join {} as {}.\n\nAccept the invitation: {}",
            organisation.name,
            role.name,
            self.invite_url(&invite_token)
        );

        if let Err(e) = self
            .notifier
            .send(&user.email, "Your invitation", &body)
            .await
        {
            warn!(user_id = %user.id, error = %e, "Invitation dispatch failed, rolling back registration");
            if let Err(rollback_err) = uow.rollback().await {
                error!(error = %rollback_err, "Rollback after failed invitation failed");
            }
            return Err(IdentityError::NotificationDispatch(e));
        }

        uow.commit().await?;

        info!(
            user_id = %user.id,
            org_id = %organisation.id,
            role_id = %role.id,
            "User registered"
        );

        Ok(Registration {
            user,
            organisation,
            role,
            invite_token,
        })
    }

    /// Authenticates a user and issues a `login` access/refresh pair
    ///
    /// # Errors
    ///
    /// `AuthenticationFailure` for an unknown email and for a wrong password.
    pub async fn login(&self, email: &str, password: &str) -> IdentityResult<SessionTokens> {
        let mut uow = self.begin().await?;
        let user = uow.find_user(UserLookup::ByEmail(email)).await?;
        uow.rollback().await?;

        let user = match user {
            Some(user) => user,
            None => {
                info!("Login failed: unknown email");
                return Err(IdentityError::AuthenticationFailure);
            }
        };

        if !self.credentials.verify(password, &user.password_hash)? {
            info!(user_id = %user.id, "Login failed: wrong password");
            return Err(IdentityError::AuthenticationFailure);
        }

        let claims = ClaimSet::for_user(user.id).audience(Audience::Login);
        let access_token = self.tokens.issue_access(claims.clone(), None)?;
        let refresh_token = self.tokens.issue_refresh(claims)?;

        if self.config.login_alerts {
            let body = "A new sign-in to your account was just recorded.";
            if let Err(e) = self.notifier.send(&user.email, "New sign-in", body).await {
                warn!(user_id = %user.id, error = %e, "Login alert dispatch failed");
            }
        }

        info!(user_id = %user.id, "User logged in");

        Ok(SessionTokens {
            access_token,
            refresh_token,
        })
    }

    /// Exchanges a `login` refresh token for a new access token
    pub async fn refresh(&self, refresh_token: &str) -> IdentityResult<String> {
        Ok(self.tokens.refresh_access(refresh_token)?)
    }

    /// Emails a short-lived password reset link
    ///
    /// The token is also returned to the caller.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no user has this email
    /// - `NotificationDispatch` if the email fails
    pub async fn forgot_password(&self, email: &str) -> IdentityResult<ResetToken> {
        let mut uow = self.begin().await?;
        let user = uow.find_user(UserLookup::ByEmail(email)).await?;
        uow.rollback().await?;

        let user = user.ok_or_else(|| IdentityError::NotFound("Email".to_string()))?;

        let token = self.tokens.issue_access(
            ClaimSet::for_user(user.id).audience(Audience::Reset),
            Some(self.config.reset_ttl_minutes),
        )?;

        let body = format!(
            "A password reset was requested for your account.\n\nReset your password: {}",
            self.reset_url(&token)
        );
        self.notifier
            .send(&user.email, "Reset your password", &body)
            .await?;

        info!(user_id = %user.id, "Password reset requested");

        Ok(ResetToken { token })
    }

    /// Replaces a user's password using a `reset` token
    ///
    /// The caller is responsible for checking that the new password and its
    /// confirmation match.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> IdentityResult<()> {
        if token.is_empty() {
            return Err(IdentityError::InvalidToken(TokenRejection::Malformed(
                "token required".to_string(),
            )));
        }

        let claims = self
            .tokens
            .validate_typed(token, Audience::Reset, TokenType::Access)?;
        let user_id = claims.user_id.ok_or(IdentityError::MissingClaims)?;

        let mut uow = self.begin().await?;

        if uow.find_user(UserLookup::ById(user_id)).await?.is_none() {
            return Err(IdentityError::UserNotFound);
        }

        let password_hash = self.credentials.hash(new_password)?;
        if !uow.update_user_password(user_id, &password_hash).await? {
            return Err(IdentityError::UserNotFound);
        }

        uow.commit().await?;

        info!(user_id = %user_id, "Password reset");
        Ok(())
    }

    /// Turns an `invite` token into a member row
    ///
    /// Redeeming the same invitation again returns the member created the
    /// first time.
    pub async fn accept_invite(&self, token: &str) -> IdentityResult<Member> {
        let claims = self
            .tokens
            .validate_typed(token, Audience::Invite, TokenType::Access)?;

        let (user_id, org_id, role_id) = match (claims.user_id, claims.org_id, claims.role_id) {
            (Some(user_id), Some(org_id), Some(role_id)) => (user_id, org_id, role_id),
            _ => return Err(IdentityError::MissingClaims),
        };

        let mut uow = self.begin().await?;
        let member = membership::create_member(uow.as_mut(), user_id, org_id, role_id).await?;
        uow.commit().await?;

        info!(member_id = %member.id, user_id = %user_id, org_id = %org_id, "Invitation accepted");
        Ok(member)
    }

    /// Moves the member `(org_id, user_id)` to `role_id`
    ///
    /// The role must belong to `org_id`. Requesting the member's current
    /// role succeeds without writing.
    pub async fn update_member_role(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> IdentityResult<Member> {
        let mut uow = self.begin().await?;

        match membership::find_role(uow.as_mut(), role_id).await? {
            Some(role) if role.org_id == org_id => {}
            _ => return Err(IdentityError::RoleNotFound),
        }

        let member = membership::find_member_by_user_and_org(uow.as_mut(), org_id, user_id)
            .await?
            .ok_or(IdentityError::MemberNotFound)?;

        if member.role_id == role_id {
            uow.rollback().await?;
            return Ok(member);
        }

        let updated = membership::update_member_role(uow.as_mut(), member.id, role_id)
            .await?
            .ok_or(IdentityError::MemberNotFound)?;
        uow.commit().await?;

        Ok(updated)
    }

    /// Deletes a member on behalf of `caller_user_id`
    ///
    /// # Errors
    ///
    /// - `NotFound` if the member does not exist
    /// - `NotAuthorized` if the member belongs to another user
    pub async fn remove_member(&self, caller_user_id: Uuid, member_id: Uuid) -> IdentityResult<()> {
        let mut uow = self.begin().await?;

        let member = uow
            .find_member_by_id(member_id)
            .await?
            .ok_or_else(|| IdentityError::NotFound("Member".to_string()))?;

        if !member.is_owned_by(caller_user_id) {
            warn!(
                member_id = %member_id,
                caller = %caller_user_id,
                "Member removal denied: caller does not own member"
            );
            return Err(IdentityError::NotAuthorized);
        }

        membership::remove_member(uow.as_mut(), member_id).await?;
        uow.commit().await?;

        Ok(())
    }
}
