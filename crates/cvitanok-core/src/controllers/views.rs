use axum::{Router, extract::State, response::Html, routing::get};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::extractors::Json;

use super::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct WelcomeMessage {
    pub message: String,
    pub docs: &'static str,
    pub admin: &'static str,
    pub welcome: &'static str,
}

#[derive(Serialize)]
struct Feature {
    name: &'static str,
    description: &'static str,
    docs_url: Option<&'static str>,
}

const FEATURES: &[Feature] = &[
    Feature {
        name: "axum",
        description: "HTTP routing and extractors on tokio, with generated OpenAPI docs",
        docs_url: Some("https://docs.rs/axum"),
    },
    Feature {
        name: "SeaORM",
        description: "Async ORM with migrations, on PostgreSQL or SQLite",
        docs_url: Some("https://www.sea-ql.org/SeaORM/"),
    },
    Feature {
        name: "Background tasks",
        description: "Named tasks with JSON arguments, run off the request path",
        docs_url: None,
    },
    Feature {
        name: "Authentication",
        description: "JWT bearer tokens, Argon2 password hashing, reset and verification flows",
        docs_url: Some("https://docs.rs/jsonwebtoken"),
    },
    Feature {
        name: "Admin panel",
        description: "Superuser-only user management",
        docs_url: None,
    },
    Feature {
        name: "Dependency overrides",
        description: "Request-scoped providers that tests can swap without touching handlers",
        docs_url: None,
    },
    Feature {
        name: "WebSocket support",
        description: "Real-time bidirectional communication",
        docs_url: None,
    },
];

const TECH_STACK: &[&str] = &[
    "Rust",
    "axum",
    "tokio",
    "SeaORM",
    "PostgreSQL",
    "SQLite",
    "Redis",
    "MiniJinja",
    "utoipa",
    "tracing",
];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/welcome", get(welcome_page))
}

/// Entry points of the application.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Links to docs, admin and welcome page", body = WelcomeMessage)),
    tag = "views"
)]
pub async fn root(State(state): State<AppState>) -> Json<WelcomeMessage> {
    Json(WelcomeMessage {
        message: format!("Welcome to {}", state.config.project_name),
        docs: "/docs",
        admin: "/admin",
        welcome: "/welcome",
    })
}

#[derive(Serialize)]
struct WelcomeContext<'a> {
    project_name: &'a str,
    version: &'a str,
    environment: &'a str,
    api_base: &'a str,
    rust_version: &'static str,
    features: &'static [Feature],
    tech_stack: &'static [&'static str],
}

/// Rendered HTML welcome page.
pub async fn welcome_page(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let config = &state.config;
    state.templates.render(
        "welcome.html",
        WelcomeContext {
            project_name: &config.project_name,
            version: &config.version,
            environment: &config.environment,
            api_base: &config.api_v1_prefix,
            rust_version: env!("CARGO_PKG_RUST_VERSION"),
            features: FEATURES,
            tech_stack: TECH_STACK,
        },
    )
}
