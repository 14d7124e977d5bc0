/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tenancy_api::{app::{build_router, AppState}, config::Config};
/// use tenancy_shared::notify::LogNotifier;
/// use tenancy_shared::store::memory::MemoryStore;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::new(Arc::new(MemoryStore::new()), Arc::new(LogNotifier), config)?;
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::{ApiError, INVALID_TOKEN_MESSAGE},
    middleware::security::SecurityHeadersLayer,
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tenancy_shared::{
    auth::{
        jwt::{Audience, TokenService, TokenType},
        password::CredentialStore,
    },
    identity::IdentityService,
    notify::Notifier,
    reporting::ReportingService,
    store::Store,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use uuid::Uuid;

/// Shared application state
///
/// Cloned per request by axum's `State` extractor; every field is cheap to
/// clone.
#[derive(Clone)]
pub struct AppState {
    pub identity: IdentityService,
    pub reporting: ReportingService,
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds state with default password hashing cost
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        config: Config,
    ) -> anyhow::Result<Self> {
        Self::with_credentials(store, notifier, config, CredentialStore::default())
    }

    /// Builds state with an explicit credential store
    pub fn with_credentials(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        config: Config,
        credentials: CredentialStore,
    ) -> anyhow::Result<Self> {
        let tokens = TokenService::new(config.jwt.token_config()?)?;

        let identity = IdentityService::new(
            Arc::clone(&store),
            notifier,
            credentials,
            tokens,
            config.identity_config(),
        );
        let reporting = ReportingService::new(Arc::clone(&store));

        Ok(Self {
            identity,
            reporting,
            store,
            config: Arc::new(config),
        })
    }
}

/// Caller identity established by [`jwt_auth_layer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
}

/// Builds the complete Axum router with all routes and middleware
///
/// ```text
/// /
/// ├── GET  /health
/// └── /v1/
///     ├── /users/
///     │   ├── POST /signup
///     │   ├── POST /signin
///     │   ├── POST /refresh
///     │   ├── POST /forgot-password
///     │   └── POST /reset-password/:token
///     ├── /members/
///     │   ├── POST   /invite/:token
///     │   ├── DELETE /:id            (bearer)
///     │   └── POST   /role           (bearer)
///     └── /stats/
///         ├── GET /roles/users/count
///         ├── GET /org/member/count
///         └── GET /org/roles/users/count
/// ```
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let user_routes = Router::new()
        .route("/signup", post(routes::users::signup))
        .route("/signin", post(routes::users::signin))
        .route("/refresh", post(routes::users::refresh))
        .route("/forgot-password", post(routes::users::forgot_password))
        .route("/reset-password/:token", post(routes::users::reset_password));

    let protected_member_routes = Router::new()
        .route("/:id", delete(routes::members::remove_member))
        .route("/role", post(routes::members::update_role))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let member_routes = Router::new()
        .route("/invite/:token", post(routes::members::accept_invite))
        .merge(protected_member_routes);

    let stats_routes = Router::new()
        .route("/roles/users/count", get(routes::stats::users_per_role))
        .route("/org/member/count", get(routes::stats::members_per_organisation))
        .route(
            "/org/roles/users/count",
            get(routes::stats::users_per_organisation_role),
        );

    let v1_routes = Router::new()
        .nest("/users", user_routes)
        .nest("/members", member_routes)
        .nest("/stats", stats_routes);

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .max_age(std::time::Duration::from_secs(3600))
    };

    let production = state.config.api.production;

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(production))
        .with_state(state)
}

/// Requires a `login` access token and injects [`AuthContext`]
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::BadRequest("Expected Bearer token".to_string()))?;

    let claims = state
        .identity
        .tokens()
        .validate_typed(token, Audience::Login, TokenType::Access)
        .map_err(|rejection| {
            tracing::debug!(reason = %rejection, "Bearer token rejected");
            ApiError::Unauthorized(INVALID_TOKEN_MESSAGE.to_string())
        })?;

    let user_id = claims
        .user_id
        .ok_or_else(|| ApiError::Unauthorized("Token has no subject".to_string()))?;

    req.extensions_mut().insert(AuthContext { user_id });

    Ok(next.run(req).await)
}
