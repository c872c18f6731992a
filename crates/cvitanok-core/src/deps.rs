//! The capabilities handlers can declare and the factories behind them.

use std::sync::Arc;

use sea_orm::{DatabaseConnection, EntityTrait};

use crate::auth;
use crate::cache::CacheService;
use crate::config::Config;
use crate::db::DatabasePool;
use crate::error::AppError;
use crate::models::user::{self, Entity as User};
use crate::provider::{
    BoxError, Capability, CapabilityKey, Factory, Provided, ProviderError, Registry,
};
use crate::tasks::TaskQueue;

/// A database session for the current request.
pub struct DbSession;

impl Capability for DbSession {
    type Resource = DatabaseConnection;
    const KEY: CapabilityKey = CapabilityKey::new("db_session");
}

/// The application configuration.
pub struct Settings;

impl Capability for Settings {
    type Resource = Config;
    const KEY: CapabilityKey = CapabilityKey::new("settings");
}

/// The application cache.
pub struct Cache;

impl Capability for Cache {
    type Resource = CacheService;
    const KEY: CapabilityKey = CapabilityKey::new("cache");
}

/// The background task queue.
pub struct Tasks;

impl Capability for Tasks {
    type Resource = TaskQueue;
    const KEY: CapabilityKey = CapabilityKey::new("tasks");
}

/// The user the bearer token belongs to. 401 without a valid token.
pub struct CurrentUser;

impl Capability for CurrentUser {
    type Resource = user::Model;
    const KEY: CapabilityKey = CapabilityKey::new("current_user");
}

/// [`CurrentUser`], 401 when the account is inactive.
pub struct CurrentActiveUser;

impl Capability for CurrentActiveUser {
    type Resource = user::Model;
    const KEY: CapabilityKey = CapabilityKey::new("current_active_user");
}

/// [`CurrentActiveUser`], 403 unless superuser.
pub struct CurrentSuperuser;

impl Capability for CurrentSuperuser {
    type Resource = user::Model;
    const KEY: CapabilityKey = CapabilityKey::new("current_superuser");
}

/// Every capability some route declares. Checked against the registry at
/// startup.
pub const ROUTE_CAPABILITIES: &[CapabilityKey] = &[
    DbSession::KEY,
    Settings::KEY,
    Cache::KEY,
    Tasks::KEY,
    CurrentUser::KEY,
    CurrentActiveUser::KEY,
    CurrentSuperuser::KEY,
];

/// Process-wide services the factories hand out.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub pool: DatabasePool,
    pub cache: CacheService,
    pub tasks: TaskQueue,
}

/// Register the production factory of every capability.
pub fn build_registry(services: &Services) -> Result<Registry, ProviderError> {
    let mut registry = Registry::new();

    let pool = services.pool.clone();
    registry
        .register(Factory::<DbSession>::new(move |_scope| {
            let pool = pool.clone();
            Box::pin(async move { Ok::<_, BoxError>(Provided::new(pool.get().await?)) })
        }))?
        .register(Factory::<Settings>::value((*services.config).clone()).process_cached())?
        .register(Factory::<Cache>::value(services.cache.clone()))?
        .register(Factory::<Tasks>::value(services.tasks.clone()))?
        .register(current_user())?
        .register(current_active_user())?
        .register(current_superuser())?;

    Ok(registry)
}

fn current_user() -> Factory<CurrentUser> {
    Factory::<CurrentUser>::new(|scope| {
        Box::pin(async move {
            let settings = scope.resolve::<Settings>().await?;
            let token = scope
                .context()
                .bearer_token()
                .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?
                .to_string();
            let claims = auth::validate_access_token(&token, &settings)?;
            let user_id = claims
                .user_id()
                .ok_or_else(|| AppError::Unauthorized("Invalid user ID in token".to_string()))?;

            let db = scope.resolve::<DbSession>().await?;
            let user = User::find_by_id(user_id)
                .one(&*db)
                .await?
                .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))?;
            Ok::<_, BoxError>(Provided::new(user))
        })
    })
    .requires(&[Settings::KEY, DbSession::KEY])
}

fn current_active_user() -> Factory<CurrentActiveUser> {
    Factory::<CurrentActiveUser>::new(|scope| {
        Box::pin(async move {
            let user = scope.resolve::<CurrentUser>().await?;
            if !user.is_active {
                return Err(AppError::Unauthorized("Inactive user".to_string()).into());
            }
            Ok::<_, BoxError>(Provided::new(user::Model::clone(&user)))
        })
    })
    .requires(&[CurrentUser::KEY])
}

fn current_superuser() -> Factory<CurrentSuperuser> {
    Factory::<CurrentSuperuser>::new(|scope| {
        Box::pin(async move {
            let user = scope.resolve::<CurrentActiveUser>().await?;
            if !user.is_superuser {
                return Err(AppError::Forbidden("Superuser privileges required".to_string()).into());
            }
            Ok::<_, BoxError>(Provided::new(user::Model::clone(&user)))
        })
    })
    .requires(&[CurrentActiveUser::KEY])
}
