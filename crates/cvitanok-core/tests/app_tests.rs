use cvitanok_core::TestApp;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

// ═══ Entry points ═══

#[tokio::test]
async fn test_root_lists_entry_points() {
    let app = TestApp::new().await;
    let res = app.client.get(&app.url("/")).await;
    assert_eq!(res.status, 200);

    let json = res.json();
    assert_eq!(json["message"], "Welcome to Cvitanok");
    assert_eq!(json["docs"], "/docs");
    assert_eq!(json["admin"], "/admin");
    assert_eq!(json["welcome"], "/welcome");
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let res = app.client.get(&app.url("/api/v1/health")).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.json(), serde_json::json!({ "status": "healthy" }));
}

#[tokio::test]
async fn test_welcome_page_renders() {
    let app = TestApp::new().await;
    let res = app.client.get(&app.url("/welcome")).await;
    assert_eq!(res.status, 200);
    assert!(res.header("content-type").unwrap().starts_with("text/html"));
    assert!(res.body.contains("Cvitanok"));
    assert!(res.body.contains("API base"));
    assert!(res.body.contains("WebSocket support"));
}

#[tokio::test]
async fn test_static_files_are_served() {
    let app = TestApp::new().await;
    let res = app.client.get(&app.url("/static/css/style.css")).await;
    assert_eq!(res.status, 200);
    assert!(res.header("content-type").unwrap().starts_with("text/css"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = TestApp::new().await;
    let res = app.client.get(&app.url("/nope")).await;
    assert_eq!(res.status, 404);
}

// ═══ API docs ═══

#[tokio::test]
async fn test_openapi_json() {
    let app = TestApp::new().await;
    let res = app.client.get(&app.url("/api/v1/openapi.json")).await;
    assert_eq!(res.status, 200);

    let json = res.json();
    assert_eq!(json["info"]["title"], "Cvitanok");
    assert!(json["paths"]["/users/me"].is_object());
    assert!(json["components"]["securitySchemes"]["bearer_auth"].is_object());
}

#[tokio::test]
async fn test_docs_ui() {
    let app = TestApp::new().await;
    let res = app.client.get(&app.url("/docs")).await;
    assert_eq!(res.status, 200);
    assert!(res.header("content-type").unwrap().starts_with("text/html"));
}

// ═══ Protected route ═══

#[tokio::test]
async fn test_protected_requires_token() {
    let app = TestApp::new().await;

    let res = app.client.get(&app.url("/api/v1/protected")).await;
    assert_eq!(res.status, 401);
    assert_eq!(res.error()["code"], "UNAUTHORIZED");

    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/protected"), "not-a-jwt")
        .await;
    assert_eq!(res.status, 401);
}

#[tokio::test]
async fn test_protected_greets_user() {
    let app = TestApp::new().await;
    let token = app.create_user("ada@example.com", "analytical-engine").await;

    let res = app
        .client
        .get_with_auth(&app.url("/api/v1/protected"), &token)
        .await;
    assert_eq!(res.status, 200);
    assert_eq!(res.json()["message"], "Hello ada@example.com!");
}

// ═══ CORS ═══

#[tokio::test]
async fn test_cors_mirrors_origin_with_credentials() {
    let app = TestApp::new().await;
    let res = reqwest::Client::new()
        .get(app.url("/api/v1/health"))
        .header("Origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();
    let headers = res.headers();
    assert_eq!(
        headers.get("access-control-allow-origin").unwrap(),
        "http://localhost:3000"
    );
    assert_eq!(
        headers.get("access-control-allow-credentials").unwrap(),
        "true"
    );
}

// ═══ WebSocket ═══

async fn echo_roundtrip(url: &str) {
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    socket.send(Message::text("ping")).await.unwrap();
    let reply = socket.next().await.unwrap().unwrap();
    assert_eq!(reply.into_text().unwrap().as_str(), "Message received: ping");

    socket.send(Message::text("again")).await.unwrap();
    let reply = socket.next().await.unwrap().unwrap();
    assert_eq!(reply.into_text().unwrap().as_str(), "Message received: again");

    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn test_websocket_echo_under_api_prefix() {
    let app = TestApp::new().await;
    echo_roundtrip(&app.ws_url("/api/v1/ws")).await;
}

#[tokio::test]
async fn test_websocket_echo_at_root() {
    let app = TestApp::new().await;
    echo_roundtrip(&app.ws_url("/ws")).await;
}
