/// End-to-end tests for the HTTP surface
///
/// Requests go through the full router (tracing, CORS, security headers,
/// bearer auth) over an in-memory store.

mod common;

use axum::http::StatusCode;
use common::{TestContext, PUBLIC_URL};
use serde_json::json;
use tenancy_shared::models::UserLookup;
use tenancy_shared::store::{Store, UnitOfWork};

#[tokio::test]
async fn test_health() {
    let ctx = TestContext::new();

    let (status, body) = ctx.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_signup_returns_registration_without_secrets() {
    let ctx = TestContext::new();

    let (status, body) = ctx.signup("a@x.com", "Acme", "owner").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["email"], "a@x.com");
    assert_eq!(body["data"]["organisation"]["name"], "Acme");
    assert_eq!(body["data"]["role"]["name"], "owner");
    assert!(body["data"].get("password_hash").is_none());
    assert!(body["data"].get("invite_token").is_none());

    let mail = ctx.notifier.sent();
    assert_eq!(mail.len(), 1);
    assert_eq!(mail[0].to, "a@x.com");
    assert_eq!(mail[0].subject, "Your invitation");
    assert!(mail[0]
        .body
        .contains(&format!("{}/v1/members/invite/", PUBLIC_URL)));
}

#[tokio::test]
async fn test_signup_role_defaults_to_owner() {
    let ctx = TestContext::new();

    let (status, body) = ctx
        .post(
            "/v1/users/signup",
            json!({ "email": "a@x.com", "password": "pw1", "org_name": "Acme" }),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["role"]["name"], "owner");
}

#[tokio::test]
async fn test_signup_duplicate_email_conflicts() {
    let ctx = TestContext::new();
    ctx.signup("a@x.com", "Acme", "owner").await;

    let (status, body) = ctx.signup("a@x.com", "Other", "member").await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "fail");
    assert_eq!(ctx.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_signup_validation_failure() {
    let ctx = TestContext::new();

    let (status, body) = ctx
        .post(
            "/v1/users/signup",
            json!({ "email": "not-an-email", "password": "pw1", "org_name": "" }),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "fail");
    let fields: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["field"].as_str())
        .collect();
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"org_name"));
}

#[tokio::test]
async fn test_signup_mail_failure_persists_nothing() {
    let ctx = TestContext::new();
    ctx.notifier.fail(true);

    let (status, body) = ctx.signup("a@x.com", "Acme", "owner").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], "fail");

    let mut uow = ctx.store.begin().await.unwrap();
    assert!(uow
        .find_user(UserLookup::ByEmail("a@x.com"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_signin_success_and_failures_look_alike() {
    let ctx = TestContext::new();
    ctx.signup("a@x.com", "Acme", "owner").await;

    let (status, body) = ctx
        .post("/v1/users/signin", json!({ "email": "a@x.com", "password": "pw1" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["access_token"].is_string());
    assert!(body["data"]["refresh_token"].is_string());

    let (wrong_pw, wrong_pw_body) = ctx
        .post("/v1/users/signin", json!({ "email": "a@x.com", "password": "nope" }))
        .await;
    let (unknown, unknown_body) = ctx
        .post("/v1/users/signin", json!({ "email": "b@x.com", "password": "pw1" }))
        .await;

    assert_eq!(wrong_pw, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_pw_body["message"], unknown_body["message"]);
}

#[tokio::test]
async fn test_refresh_issues_access_token() {
    let ctx = TestContext::new();
    ctx.signup("a@x.com", "Acme", "owner").await;
    let (_, body) = ctx
        .post("/v1/users/signin", json!({ "email": "a@x.com", "password": "pw1" }))
        .await;

    let refresh = body["data"]["refresh_token"].as_str().unwrap().to_string();
    let access = body["data"]["access_token"].as_str().unwrap().to_string();

    let (status, body) = ctx
        .post("/v1/users/refresh", json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["access_token"].is_string());

    // An access token is not a refresh token
    let (status, _) = ctx
        .post("/v1/users/refresh", json!({ "refresh_token": access }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let ctx = TestContext::new();
    ctx.signup("a@x.com", "Acme", "owner").await;

    let (status, body) = ctx
        .post("/v1/users/forgot-password", json!({ "email": "a@x.com" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let mail = ctx.notifier.sent();
    let reset_mail = mail.last().unwrap();
    assert_eq!(reset_mail.subject, "Reset your password");
    assert!(reset_mail
        .body
        .contains(&format!("{}/v1/users/reset-password/{}", PUBLIC_URL, token)));

    let uri = format!("/v1/users/reset-password/{}", token);

    let (status, _) = ctx
        .post(&uri, json!({ "new_password": "pw2", "confirm_password": "pw3" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = ctx
        .post(&uri, json!({ "new_password": "pw2", "confirm_password": "pw2" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Password reset successful");

    let (old, _) = ctx
        .post("/v1/users/signin", json!({ "email": "a@x.com", "password": "pw1" }))
        .await;
    let (new, _) = ctx
        .post("/v1/users/signin", json!({ "email": "a@x.com", "password": "pw2" }))
        .await;
    assert_eq!(old, StatusCode::UNAUTHORIZED);
    assert_eq!(new, StatusCode::OK);
}

#[tokio::test]
async fn test_forgot_password_unknown_email() {
    let ctx = TestContext::new();

    let (status, body) = ctx
        .post("/v1/users/forgot-password", json!({ "email": "ghost@x.com" }))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "fail");
    assert!(ctx.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_reset_rejects_invitation_token() {
    let ctx = TestContext::new();
    ctx.signup("a@x.com", "Acme", "owner").await;
    let invite = ctx.notifier.invite_token("a@x.com");

    let (status, _) = ctx
        .post(
            &format!("/v1/users/reset-password/{}", invite),
            json!({ "new_password": "pw2", "confirm_password": "pw2" }),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_accept_invite_is_idempotent() {
    let ctx = TestContext::new();
    let (status, body) = ctx.signup("a@x.com", "Acme", "owner").await;
    assert_eq!(status, StatusCode::CREATED);
    let user_id = body["data"]["id"].clone();
    let org_id = body["data"]["organisation"]["id"].clone();

    let token = ctx.notifier.invite_token("a@x.com");
    let uri = format!("/v1/members/invite/{}", token);

    let (status, first) = ctx.send("POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["user_id"], user_id);
    assert_eq!(first["data"]["org_id"], org_id);

    let (status, second) = ctx.send("POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["id"], second["data"]["id"]);
}

#[tokio::test]
async fn test_accept_invite_rejects_garbage() {
    let ctx = TestContext::new();

    let (status, body) = ctx
        .send("POST", "/v1/members/invite/not-a-token", None, None)
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "fail");
    assert_eq!(body["message"], "Invalid or expired token");
}

#[tokio::test]
async fn test_member_routes_require_bearer() {
    let ctx = TestContext::new();
    let (member, _) = ctx.onboard("a@x.com", "Acme", "owner").await;
    let uri = format!("/v1/members/{}", member["id"].as_str().unwrap());

    let (status, _) = ctx.send("DELETE", &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = ctx.send("DELETE", &uri, None, Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid or expired token");

    // Invitation tokens are not session tokens
    ctx.signup("b@x.com", "Acme", "viewer").await;
    let invite = ctx.notifier.invite_token("b@x.com");
    let (status, _) = ctx.send("DELETE", &uri, None, Some(&invite)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_remove_member_owner_only() {
    let ctx = TestContext::new();
    let (member_a, access_a) = ctx.onboard("a@x.com", "Acme", "owner").await;
    let (_, access_b) = ctx.onboard("b@x.com", "Acme", "viewer").await;
    let uri = format!("/v1/members/{}", member_a["id"].as_str().unwrap());

    let (status, body) = ctx.send("DELETE", &uri, None, Some(&access_b)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], "fail");

    let (status, body) = ctx.send("DELETE", &uri, None, Some(&access_a)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Member removed");

    let (status, _) = ctx.send("DELETE", &uri, None, Some(&access_a)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_member_role() {
    let ctx = TestContext::new();
    let (member_a, access_a) = ctx.onboard("a@x.com", "Acme", "owner").await;
    let (status, reg_b) = ctx.signup("b@x.com", "Acme", "viewer").await;
    assert_eq!(status, StatusCode::CREATED);
    let viewer_role = reg_b["data"]["role"]["id"].clone();

    let (status, body) = ctx
        .send(
            "POST",
            "/v1/members/role",
            Some(json!({
                "org_id": member_a["org_id"],
                "user_id": member_a["user_id"],
                "role_id": viewer_role,
            })),
            Some(&access_a),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role_id"], viewer_role);
    assert_eq!(body["data"]["id"], member_a["id"]);

    // A role from another organisation is not found in this one
    let (_, reg_c) = ctx.signup("c@x.com", "Globex", "admin").await;
    let (status, _) = ctx
        .send(
            "POST",
            "/v1/members/role",
            Some(json!({
                "org_id": member_a["org_id"],
                "user_id": member_a["user_id"],
                "role_id": reg_c["data"]["role"]["id"],
            })),
            Some(&access_a),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_endpoints() {
    let ctx = TestContext::new();
    ctx.onboard("a@x.com", "Acme", "owner").await;
    ctx.onboard("b@x.com", "Acme", "viewer").await;
    ctx.onboard("c@x.com", "Globex", "owner").await;

    let (status, body) = ctx.get("/v1/stats/roles/users/count").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Data fetched successfully");
    assert_eq!(body["data"]["owner"], 2);
    assert_eq!(body["data"]["viewer"], 1);

    let (status, body) = ctx.get("/v1/stats/org/member/count").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["Acme"], 2);
    assert_eq!(body["data"]["Globex"], 1);

    let (status, body) = ctx.get("/v1/stats/org/roles/users/count").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["Acme"]["owner"], 1);
    assert_eq!(body["data"]["Acme"]["viewer"], 1);
    assert_eq!(body["data"]["Globex"]["owner"], 1);

    // A window in the past excludes everything
    let (status, body) = ctx
        .get("/v1/stats/org/member/count?from=2000-01-01T00:00:00Z&to=2000-12-31T00:00:00Z")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({}));

    // Only one bound means no window
    let (status, body) = ctx
        .get("/v1/stats/org/member/count?from=2000-01-01T00:00:00Z")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["Acme"], 2);
}

#[tokio::test]
async fn test_security_headers_present() {
    let ctx = TestContext::new();

    let request = axum::http::Request::builder()
        .uri("/health")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(ctx.app.clone(), request)
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.get("strict-transport-security").is_none());
}
