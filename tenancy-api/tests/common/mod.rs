/// Common test utilities for API tests
///
/// Every test gets its own router over a fresh in-memory store, a notifier
/// that records outgoing mail, and cheap password hashing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tenancy_api::app::{build_router, AppState};
use tenancy_api::config::Config;
use tenancy_shared::auth::password::{CredentialStore, PasswordConfig};
use tenancy_shared::notify::{Notifier, NotifyError};
use tenancy_shared::store::memory::MemoryStore;
use tower::ServiceExt;

pub const PUBLIC_URL: &str = "http://tenancy.test";

/// One recorded email
#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Notifier that records mail and can be told to fail
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMail>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    /// Token from the last invitation sent to `to`
    pub fn invite_token(&self, to: &str) -> String {
        self.token_after(to, "/v1/members/invite/")
    }

    fn token_after(&self, to: &str, marker: &str) -> String {
        let mail = self
            .sent()
            .into_iter()
            .rev()
            .find(|m| m.to == to && m.body.contains(marker))
            .unwrap_or_else(|| panic!("no mail with {} sent to {}", marker, to));

        let start = mail.body.find(marker).unwrap() + marker.len();
        mail.body[start..]
            .split_whitespace()
            .next()
            .unwrap()
            .to_string()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<u16, NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("connection refused".to_string()));
        }

        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(202)
    }
}

/// Test context containing the router and its collaborators
pub struct TestContext {
    pub app: axum::Router,
    pub store: MemoryStore,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestContext {
    pub fn new() -> Self {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DATABASE_URL", "postgresql://localhost/unused"),
            ("JWT_SECRET", "api-test-secret-key-at-least-32-bytes"),
            ("PUBLIC_URL", PUBLIC_URL),
        ]);
        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
            .expect("test config should load");

        let store = MemoryStore::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let credentials = CredentialStore::new(PasswordConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
            output_len: 32,
        });

        let state = AppState::with_credentials(
            Arc::new(store.clone()),
            notifier.clone(),
            config,
            credentials,
        )
        .expect("test state should build");

        Self {
            app: build_router(state),
            store,
            notifier,
        }
    }

    /// Sends a request and returns status plus parsed JSON body
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, json)
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(body), None).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send("GET", uri, None, None).await
    }

    /// Signs up `email` into `org` as `role`
    pub async fn signup(&self, email: &str, org: &str, role: &str) -> (StatusCode, Value) {
        self.post(
            "/v1/users/signup",
            serde_json::json!({
                "email": email,
                "password": "pw1",
                "org_name": org,
                "role": role,
            }),
        )
        .await
    }

    /// Signs up, accepts the invitation, signs in
    ///
    /// Returns `(member, access_token)`.
    pub async fn onboard(&self, email: &str, org: &str, role: &str) -> (Value, String) {
        let (status, _) = self.signup(email, org, role).await;
        assert_eq!(status, StatusCode::CREATED);

        let token = self.notifier.invite_token(email);
        let (status, body) = self
            .send("POST", &format!("/v1/members/invite/{}", token), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let member = body["data"].clone();

        let (status, body) = self
            .post(
                "/v1/users/signin",
                serde_json::json!({ "email": email, "password": "pw1" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let access = body["data"]["access_token"].as_str().unwrap().to_string();

        (member, access)
    }
}
