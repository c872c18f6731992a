use axum::body::Body;
use axum::http::{Request, StatusCode};
use cvitanok_core::accounts::{self, UserFilter};
use cvitanok_core::controllers::AppState;
use cvitanok_core::db::connect_in_memory;
use cvitanok_core::deps::{Cache, DbSession};
use cvitanok_core::extractors::{Inject, Json, Pagination};
use cvitanok_core::migrations::Migrator;
use cvitanok_core::models::UserRead;
use cvitanok_core::provider::{BoxError, Capability, CapabilityKey, Factory, Provided};
use cvitanok_core::routing::get;
use cvitanok_core::{App, AppError, CacheService, Router, TestApp};
use sea_orm_migration::MigratorTrait;
use tower::ServiceExt;

async fn list_all(deps: Inject<(DbSession,)>) -> Result<Json<Vec<UserRead>>, AppError> {
    deps.run(|(db,)| async move {
        let (users, _) =
            accounts::list_users(&*db, &UserFilter::default(), &Pagination::default()).await?;
        Ok(Json(users.into_iter().map(UserRead::from).collect()))
    })
    .await
}

async fn cached(deps: Inject<(Cache,)>) -> Result<Json<Option<String>>, AppError> {
    deps.run(|(cache,)| async move { Ok(Json(cache.get("greeting").await?)) })
        .await
}

/// Declared by a handler but never registered.
struct Mailer;

impl Capability for Mailer {
    type Resource = String;
    const KEY: CapabilityKey = CapabilityKey::new("mailer");
}

async fn send_mail(deps: Inject<(DbSession, Mailer)>) -> Result<Json<String>, AppError> {
    deps.run(|(_db, mailer)| async move { Ok(Json((*mailer).clone())) })
        .await
}

fn extra_routes() -> Router<AppState> {
    Router::new()
        .route("/test/users", get(list_all))
        .route("/test/cache", get(cached))
        .route("/test/mail", get(send_mail))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ═══ Through the test harness ═══

#[tokio::test]
async fn test_handler_sees_overridden_session_and_pool_stays_idle() {
    let app = TestApp::with_routes(extra_routes()).await;

    let res = app.client.get(&app.url("/test/users")).await;
    assert_eq!(res.status, 200, "{}", res.body);
    assert_eq!(res.json(), serde_json::json!([]));
    assert!(!app.pool.is_connected());

    app.create_user("seen@example.com", "long-password").await;
    let res = app.client.get(&app.url("/test/users")).await;
    assert_eq!(res.json()[0]["email"], "seen@example.com");
    assert!(!app.pool.is_connected());
}

#[tokio::test]
async fn test_each_test_app_gets_its_own_database() {
    let first = TestApp::new().await;
    let second = TestApp::new().await;
    first.create_user("only-first@example.com", "long-password").await;

    assert_eq!(accounts::count_users(&first.db).await.unwrap(), 1);
    assert_eq!(accounts::count_users(&second.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unregistered_capability_is_a_server_error() {
    let app = TestApp::with_routes(extra_routes()).await;

    let res = app.client.get(&app.url("/test/mail")).await;
    assert_eq!(res.status, 500);
    assert_eq!(res.error()["code"], "UNRESOLVED_DEPENDENCY");
    assert!(res.error()["message"].as_str().unwrap().contains("mailer"));
}

// ═══ Router level ═══

#[tokio::test]
async fn test_router_oneshot_with_session_override() {
    let mut config = TestApp::test_config();
    config.auto_migrate = false;
    let app = App::with_config(config).await.unwrap().routes(extra_routes());

    let db = connect_in_memory().await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    let overrides = app.overrides().scope();
    overrides.set_override(Factory::<DbSession>::value(db));

    let response = app
        .router()
        .oneshot(Request::builder().uri("/test/users").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));
    assert!(!app.pool.is_connected());

    overrides.finish();
    assert!(app.overrides().is_empty());
}

#[tokio::test]
async fn test_cache_override_and_unavailable_resource() {
    let mut config = TestApp::test_config();
    config.auto_migrate = false;
    let app = App::with_config(config).await.unwrap().routes(extra_routes());
    let overrides = app.overrides().scope();

    let cache = CacheService::in_memory();
    cache.set("greeting", "hi", None).await.unwrap();
    overrides.set_override(Factory::<Cache>::value(cache));
    let response = app
        .router()
        .oneshot(Request::builder().uri("/test/cache").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!("hi"));

    overrides.set_override(Factory::<Cache>::new(|_scope| {
        Box::pin(async { Err::<Provided<CacheService>, BoxError>("cache is down".into()) })
    }));
    let response = app
        .router()
        .oneshot(Request::builder().uri("/test/cache").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "RESOURCE_UNAVAILABLE");
    assert!(!body["error"]["message"].as_str().unwrap().contains("down"));
}
