use cvitanok_core::TestApp;
use cvitanok_core::accounts;
use cvitanok_core::auth::jwt;
use serde_json::json;

async fn register(app: &TestApp, body: serde_json::Value) -> cvitanok_core::TestResponse {
    app.client
        .post(&app.url("/auth/register"), &body.to_string())
        .await
}

// ═══ Register ═══

#[tokio::test]
async fn test_register_creates_plain_active_user() {
    let app = TestApp::new().await;
    let res = register(
        &app,
        json!({
            "email": "Grace@Example.com",
            "password": "compiler-pioneer",
            "is_superuser": true,
            "is_verified": true
        }),
    )
    .await;
    assert_eq!(res.status, 201, "{}", res.body);

    let user = res.json();
    assert_eq!(user["email"], "grace@example.com");
    assert_eq!(user["is_active"], true);
    assert_eq!(user["is_superuser"], false);
    assert_eq!(user["is_verified"], false);
    assert!(user.get("hashed_password").is_none());
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let app = TestApp::new().await;
    let body = json!({ "email": "dup@example.com", "password": "long-password" });
    assert_eq!(register(&app, body.clone()).await.status, 201);

    let res = register(&app, json!({ "email": "DUP@example.com", "password": "long-password" })).await;
    assert_eq!(res.status, 400);
    assert_eq!(res.error()["code"], "REGISTER_USER_ALREADY_EXISTS");
}

#[tokio::test]
async fn test_register_password_policy() {
    let app = TestApp::new().await;

    let res = register(&app, json!({ "email": "p@example.com", "password": "short" })).await;
    assert_eq!(res.status, 400);
    assert_eq!(res.error()["code"], "REGISTER_INVALID_PASSWORD");

    let res = register(
        &app,
        json!({ "email": "p@example.com", "password": "xxp@example.comxx" }),
    )
    .await;
    assert_eq!(res.status, 400);
    assert_eq!(res.error()["code"], "REGISTER_INVALID_PASSWORD");
}

#[tokio::test]
async fn test_register_invalid_email_is_422() {
    let app = TestApp::new().await;
    let res = register(&app, json!({ "email": "not-an-email", "password": "long-password" })).await;
    assert_eq!(res.status, 422);
    assert_eq!(res.error()["fields"][0]["field"], "email");
}

#[tokio::test]
async fn test_register_malformed_json_is_422() {
    let app = TestApp::new().await;
    let res = app.client.post(&app.url("/auth/register"), "{not json").await;
    assert_eq!(res.status, 422);
    assert_eq!(res.error()["code"], "VALIDATION_ERROR");
}

// ═══ Login / logout ═══

#[tokio::test]
async fn test_login_returns_bearer_token() {
    let app = TestApp::new().await;
    app.create_user("login@example.com", "long-password").await;

    let res = app
        .client
        .post_form(
            &app.url("/auth/jwt/login"),
            &[("username", "login@example.com"), ("password", "long-password")],
        )
        .await;
    assert_eq!(res.status, 200);
    let json = res.json();
    assert_eq!(json["token_type"], "bearer");

    let claims =
        jwt::validate_access_token(json["access_token"].as_str().unwrap(), &app.config).unwrap();
    assert_eq!(claims.aud, jwt::AUTH_AUDIENCE);
}

#[tokio::test]
async fn test_login_bad_credentials() {
    let app = TestApp::new().await;
    app.create_user("login@example.com", "long-password").await;

    for (username, password) in [
        ("login@example.com", "wrong-password"),
        ("nobody@example.com", "long-password"),
    ] {
        let res = app
            .client
            .post_form(
                &app.url("/auth/jwt/login"),
                &[("username", username), ("password", password)],
            )
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.error()["code"], "LOGIN_BAD_CREDENTIALS");
    }
}

#[tokio::test]
async fn test_inactive_user_cannot_log_in_or_use_token() {
    let app = TestApp::new().await;
    let token = app.create_user("gone@example.com", "long-password").await;
    let admin = app.create_superuser("root@example.com", "root-password").await;

    let user = accounts::find_by_email(&app.db, "gone@example.com")
        .await
        .unwrap()
        .unwrap();
    let res = app
        .client
        .patch_with_auth(
            &app.url(&format!("/users/{}", user.id)),
            &admin,
            &json!({ "is_active": false }).to_string(),
        )
        .await;
    assert_eq!(res.status, 200);

    let res = app.client.get_with_auth(&app.url("/users/me"), &token).await;
    assert_eq!(res.status, 401);
    assert!(res.error()["message"].as_str().unwrap().contains("Inactive"));

    let res = app
        .client
        .post_form(
            &app.url("/auth/jwt/login"),
            &[("username", "gone@example.com"), ("password", "long-password")],
        )
        .await;
    assert_eq!(res.error()["code"], "LOGIN_BAD_CREDENTIALS");
}

#[tokio::test]
async fn test_logout() {
    let app = TestApp::new().await;
    let token = app.create_user("bye@example.com", "long-password").await;

    let res = app
        .client
        .post_with_auth(&app.url("/auth/jwt/logout"), &token, "")
        .await;
    assert_eq!(res.status, 204);

    let res = app.client.post(&app.url("/auth/jwt/logout"), "").await;
    assert_eq!(res.status, 401);
}

// ═══ Password reset ═══

#[tokio::test]
async fn test_forgot_password_is_always_accepted() {
    let app = TestApp::new().await;
    app.create_user("known@example.com", "long-password").await;

    for email in ["known@example.com", "unknown@example.com"] {
        let res = app
            .client
            .post(&app.url("/auth/forgot-password"), &json!({ "email": email }).to_string())
            .await;
        assert_eq!(res.status, 202);
    }
}

#[tokio::test]
async fn test_reset_password_flow() {
    let app = TestApp::new().await;
    app.create_user("reset@example.com", "old-password").await;
    let user = accounts::find_by_email(&app.db, "reset@example.com")
        .await
        .unwrap()
        .unwrap();
    let token = jwt::create_reset_token(&user, &app.config).unwrap();

    let res = app
        .client
        .post(
            &app.url("/auth/reset-password"),
            &json!({ "token": token, "password": "new-password" }).to_string(),
        )
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    app.login("reset@example.com", "new-password").await;

    // The password changed, so the same token no longer works.
    let res = app
        .client
        .post(
            &app.url("/auth/reset-password"),
            &json!({ "token": token, "password": "newer-password" }).to_string(),
        )
        .await;
    assert_eq!(res.status, 400);
    assert_eq!(res.error()["code"], "RESET_PASSWORD_BAD_TOKEN");
}

#[tokio::test]
async fn test_reset_password_rejects_bad_input() {
    let app = TestApp::new().await;
    app.create_user("reset@example.com", "old-password").await;
    let user = accounts::find_by_email(&app.db, "reset@example.com")
        .await
        .unwrap()
        .unwrap();

    let res = app
        .client
        .post(
            &app.url("/auth/reset-password"),
            &json!({ "token": "garbage", "password": "new-password" }).to_string(),
        )
        .await;
    assert_eq!(res.error()["code"], "RESET_PASSWORD_BAD_TOKEN");

    // A verification token is not a reset token.
    let verify = jwt::create_verify_token(&user, &app.config).unwrap();
    let res = app
        .client
        .post(
            &app.url("/auth/reset-password"),
            &json!({ "token": verify, "password": "new-password" }).to_string(),
        )
        .await;
    assert_eq!(res.error()["code"], "RESET_PASSWORD_BAD_TOKEN");

    let token = jwt::create_reset_token(&user, &app.config).unwrap();
    let res = app
        .client
        .post(
            &app.url("/auth/reset-password"),
            &json!({ "token": token, "password": "tiny" }).to_string(),
        )
        .await;
    assert_eq!(res.status, 400);
    assert_eq!(res.error()["code"], "RESET_PASSWORD_INVALID_PASSWORD");
}

// ═══ Verification ═══

#[tokio::test]
async fn test_verify_flow() {
    let app = TestApp::new().await;
    app.create_user("verify@example.com", "long-password").await;

    let res = app
        .client
        .post(
            &app.url("/auth/request-verify-token"),
            &json!({ "email": "verify@example.com" }).to_string(),
        )
        .await;
    assert_eq!(res.status, 202);

    let user = accounts::find_by_email(&app.db, "verify@example.com")
        .await
        .unwrap()
        .unwrap();
    let token = jwt::create_verify_token(&user, &app.config).unwrap();
    let body = json!({ "token": token }).to_string();

    let res = app.client.post(&app.url("/auth/verify"), &body).await;
    assert_eq!(res.status, 200, "{}", res.body);
    assert_eq!(res.json()["is_verified"], true);

    let res = app.client.post(&app.url("/auth/verify"), &body).await;
    assert_eq!(res.status, 400);
    assert_eq!(res.error()["code"], "VERIFY_USER_ALREADY_VERIFIED");
}

#[tokio::test]
async fn test_verify_rejects_bad_token() {
    let app = TestApp::new().await;
    let res = app
        .client
        .post(&app.url("/auth/verify"), &json!({ "token": "garbage" }).to_string())
        .await;
    assert_eq!(res.status, 400);
    assert_eq!(res.error()["code"], "VERIFY_USER_BAD_TOKEN");
}
