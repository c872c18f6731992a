//! Cvitanok: a web backend template with request-scoped dependency
//! injection.
//!
//! Handlers declare the capabilities they need (a database session, the
//! current user, settings) with [`Inject`](extractors::Inject); the
//! [`provider`] module resolves them per request and releases them once the
//! handler returns. Tests substitute any provider through the
//! [`OverrideTable`](provider::OverrideTable) without touching handlers.

pub mod accounts;
pub mod app;
pub mod auth;
pub mod cache;
pub mod config;
pub mod controllers;
pub mod db;
pub mod deps;
pub mod error;
pub mod extractors;
pub mod logging;
pub mod migrations;
pub mod models;
pub mod openapi;
pub mod prelude;
pub mod provider;
pub mod response;
pub mod routing;
pub mod tasks;
pub mod templates;
pub mod testing;

pub use app::App;
pub use cache::CacheService;
pub use config::Config;
pub use error::AppError;
pub use response::ApiResponse;
pub use testing::{TestApp, TestClient, TestResponse};

// Re-exported so applications need not depend on axum directly.
pub use axum::{self, Router, extract, http};
