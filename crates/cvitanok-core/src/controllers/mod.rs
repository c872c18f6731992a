use std::sync::Arc;

use crate::config::Config;
use crate::provider::Dispatcher;
use crate::templates::Templates;

/// Shared application state available in all handlers.
///
/// Request-scoped resources (database sessions, the current user) are not
/// here: handlers declare them with [`Inject`](crate::extractors::Inject).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Dispatcher,
    pub templates: Templates,
}

pub mod admin;
pub mod api;
pub mod auth;
pub mod users;
pub mod views;
