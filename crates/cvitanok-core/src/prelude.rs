//! Everything a handler module usually needs.
//!
//! ```rust,ignore
//! use cvitanok_core::prelude::*;
//! ```

// ── Core types ─────────────────────────────────────────────────
pub use crate::ApiResponse;
pub use crate::App;
pub use crate::AppError;
pub use crate::Config;
pub use crate::controllers::AppState;

// ── Providers ──────────────────────────────────────────────────
pub use crate::deps::{
    Cache, CurrentActiveUser, CurrentSuperuser, CurrentUser, DbSession, Settings, Tasks,
};
pub use crate::provider::{BoxError, Capability, CapabilityKey, Factory, Provided};

// ── Router & routing ───────────────────────────────────────────
pub use crate::Router;
pub use crate::routing::{delete, get, patch, post, put};

// ── Extractors ─────────────────────────────────────────────────
pub use crate::extract::{Path, Query, State};
pub use crate::extractors::{Inject, Json, Pagination};

// ── HTTP types ─────────────────────────────────────────────────
pub use crate::http::StatusCode;

pub use serde::{Deserialize, Serialize};
