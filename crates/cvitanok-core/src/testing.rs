use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderMap;
use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;

use crate::accounts;
use crate::config::Config;
use crate::controllers::AppState;
use crate::db::{DatabasePool, connect_in_memory};
use crate::deps::DbSession;
use crate::migrations::Migrator;
use crate::models::user::UserUpdate;
use crate::provider::{BoxError, Dispatcher, Factory, OverrideScope, Provided};

/// A running application for integration tests.
///
/// Every `TestApp` gets its own migrated in-memory SQLite database, installed
/// as an override of [`DbSession`]. The configured `database_url` is never
/// contacted.
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn health() {
///     let app = TestApp::new().await;
///     let res = app.client.get(&app.url("/api/v1/health")).await;
///     assert_eq!(res.status, 200);
/// }
/// ```
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: TestClient,
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub pool: DatabasePool,
    pub dispatcher: Dispatcher,
    /// Clears the overrides when the test app is dropped.
    pub overrides: OverrideScope,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Self::test_config()).await
    }

    /// Defaults for tests: plain environment, fixed secret, and a database
    /// URL nothing can reach.
    pub fn test_config() -> Config {
        let mut config = Config::from_lookup(|_| None).expect("default config is valid");
        config.environment = "test".to_string();
        config.secret_key = "test-secret-key-for-testing".to_string();
        config.database_url = "postgres://nobody@127.0.0.1:1/unreachable".to_string();
        config.server_host = "127.0.0.1".to_string();
        config.server_port = 0;
        config.cors_origins = vec!["*".to_string()];
        config
    }

    pub async fn with_config(config: Config) -> Self {
        Self::build(config, None).await
    }

    /// Serve extra routes next to the built-in ones.
    pub async fn with_routes(routes: Router<AppState>) -> Self {
        Self::build(Self::test_config(), Some(routes)).await
    }

    async fn build(mut config: Config, routes: Option<Router<AppState>>) -> Self {
        config.auto_migrate = false;

        let db = connect_in_memory()
            .await
            .expect("Failed to open in-memory database");
        Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");

        let mut app = crate::App::with_config(config)
            .await
            .expect("Failed to create test app");
        if let Some(routes) = routes {
            app = app.routes(routes);
        }

        let overrides = app.overrides().scope();
        let session = db.clone();
        overrides.set_override(Factory::<DbSession>::new(move |_scope| {
            let session = session.clone();
            Box::pin(async move { Ok::<_, BoxError>(Provided::new(session)) })
        }));

        let router = app.router();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().expect("Failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("test server failed");
        });

        TestApp {
            addr,
            client: TestClient::new(addr),
            db,
            config: app.config.clone(),
            pool: app.pool.clone(),
            dispatcher: app.dispatcher(),
            overrides,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Register a user and return a bearer token for it.
    pub async fn create_user(&self, email: &str, password: &str) -> String {
        let body = serde_json::json!({ "email": email, "password": password });
        let res = self
            .client
            .post(&self.url("/auth/register"), &body.to_string())
            .await;
        assert_eq!(res.status, 201, "Registration failed: {}", res.body);
        self.login(email, password).await
    }

    /// Register a user, promote it to superuser and return a bearer token.
    pub async fn create_superuser(&self, email: &str, password: &str) -> String {
        let body = serde_json::json!({ "email": email, "password": password });
        let res = self
            .client
            .post(&self.url("/auth/register"), &body.to_string())
            .await;
        assert_eq!(res.status, 201, "Registration failed: {}", res.body);

        let user = accounts::find_by_email(&self.db, email)
            .await
            .expect("lookup failed")
            .expect("registered user is missing");
        let promote = UserUpdate {
            is_superuser: Some(true),
            ..UserUpdate::default()
        };
        accounts::update_user(&self.db, user, promote, self.config.min_password_length)
            .await
            .expect("Failed to promote user");

        self.login(email, password).await
    }

    /// Log in through the form endpoint and return the bearer token.
    pub async fn login(&self, email: &str, password: &str) -> String {
        let res = self
            .client
            .post_form(
                &self.url("/auth/jwt/login"),
                &[("username", email), ("password", password)],
            )
            .await;
        assert_eq!(res.status, 200, "Login failed: {}", res.body);
        res.json()["access_token"]
            .as_str()
            .expect("no access_token in login response")
            .to_string()
    }
}

/// A small HTTP client with one method per request shape the tests use.
#[derive(Clone)]
pub struct TestClient {
    inner: reqwest::Client,
    base_addr: SocketAddr,
}

impl TestClient {
    pub fn new(addr: SocketAddr) -> Self {
        TestClient {
            inner: reqwest::Client::new(),
            base_addr: addr,
        }
    }

    pub async fn get(&self, url: &str) -> TestResponse {
        self.send(self.inner.get(url)).await
    }

    pub async fn get_with_auth(&self, url: &str, token: &str) -> TestResponse {
        self.send(self.inner.get(url).bearer_auth(token)).await
    }

    /// POST a JSON body.
    pub async fn post(&self, url: &str, body: &str) -> TestResponse {
        self.send(json_body(self.inner.post(url), body)).await
    }

    pub async fn post_with_auth(&self, url: &str, token: &str, body: &str) -> TestResponse {
        self.send(json_body(self.inner.post(url).bearer_auth(token), body))
            .await
    }

    /// POST an `application/x-www-form-urlencoded` body.
    pub async fn post_form(&self, url: &str, fields: &[(&str, &str)]) -> TestResponse {
        self.send(self.inner.post(url).form(fields)).await
    }

    pub async fn patch_with_auth(&self, url: &str, token: &str, body: &str) -> TestResponse {
        self.send(json_body(self.inner.patch(url).bearer_auth(token), body))
            .await
    }

    pub async fn delete_with_auth(&self, url: &str, token: &str) -> TestResponse {
        self.send(self.inner.delete(url).bearer_auth(token)).await
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.base_addr)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> TestResponse {
        let res = request.send().await.expect("request failed");
        TestResponse::from_response(res).await
    }
}

fn json_body(request: reqwest::RequestBuilder, body: &str) -> reqwest::RequestBuilder {
    request
        .header("Content-Type", "application/json")
        .body(body.to_string())
}

/// Status, headers and body of a response, read eagerly.
#[derive(Debug)]
pub struct TestResponse {
    pub status: u16,
    pub body: String,
    pub headers: HeaderMap,
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let headers = res.headers().clone();
        let body = res.text().await.unwrap_or_default();
        TestResponse {
            status,
            body,
            headers,
        }
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("Failed to parse response as JSON")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `error` object of an error envelope.
    pub fn error(&self) -> serde_json::Value {
        self.json()["error"].clone()
    }

    pub fn data(&self) -> serde_json::Value {
        self.json()["data"].clone()
    }
}
