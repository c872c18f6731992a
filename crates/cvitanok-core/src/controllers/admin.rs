//! Superuser-only user management: an HTML listing at `/admin` and a JSON
//! API under `/admin/api/users`.

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::accounts::{self, SortField, SortOrder, UserFilter};
use crate::deps::{CurrentSuperuser, DbSession, Settings};
use crate::error::AppError;
use crate::extractors::{Inject, Json, Pagination};
use crate::models::user::{UserCreate, UserRead, UserUpdate};
use crate::response::ApiResponse;

use super::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct UserPage {
    pub items: Vec<UserRead>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin", get(index))
        .route("/admin/api/users", get(list_users).post(create_user))
        .route("/admin/api/users/{id}", get(get_user).patch(update_user))
}

#[derive(Serialize)]
struct AdminContext<'a> {
    project_name: &'a str,
    version: &'a str,
    environment: &'a str,
    users: Vec<UserRead>,
    total: u64,
    search: Option<&'a str>,
    sort: SortField,
    order: SortOrder,
}

/// HTML table of users with search and sorting.
pub async fn index(
    State(state): State<AppState>,
    deps: Inject<(CurrentSuperuser, DbSession)>,
    Query(filter): Query<UserFilter>,
    page: Pagination,
) -> Result<Html<String>, AppError> {
    deps.run(|(_admin, db)| async move {
        let (users, total) = accounts::list_users(&*db, &filter, &page).await?;
        let config = &state.config;
        state.templates.render(
            "admin.html",
            AdminContext {
                project_name: &config.project_name,
                version: &config.version,
                environment: &config.environment,
                users: users.into_iter().map(UserRead::from).collect(),
                total,
                search: filter.search.as_deref(),
                sort: filter.sort,
                order: filter.order,
            },
        )
    })
    .await
}

/// Page through users.
#[utoipa::path(
    get,
    path = "/admin/api/users",
    params(UserFilter, Pagination),
    responses(
        (status = 200, description = "One page of users", body = ApiResponse<UserPage>),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Not a superuser")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn list_users(
    deps: Inject<(CurrentSuperuser, DbSession)>,
    Query(filter): Query<UserFilter>,
    page: Pagination,
) -> Result<ApiResponse<UserPage>, AppError> {
    deps.run(|(_admin, db)| async move {
        let (users, total) = accounts::list_users(&*db, &filter, &page).await?;
        Ok(ApiResponse::success(UserPage {
            items: users.into_iter().map(UserRead::from).collect(),
            total,
            limit: page.limit,
            offset: page.offset,
        }))
    })
    .await
}

/// Create a user with any flags set.
#[utoipa::path(
    post,
    path = "/admin/api/users",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User created", body = ApiResponse<UserRead>),
        (status = 400, description = "REGISTER_USER_ALREADY_EXISTS or REGISTER_INVALID_PASSWORD"),
        (status = 403, description = "Not a superuser")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn create_user(
    deps: Inject<(CurrentSuperuser, DbSession, Settings)>,
    Json(payload): Json<UserCreate>,
) -> Result<(StatusCode, ApiResponse<UserRead>), AppError> {
    deps.run(|(admin, db, settings)| async move {
        let user =
            accounts::create_user(&*db, payload, settings.min_password_length, false).await?;
        tracing::info!(admin_id = admin.id, user_id = user.id, "user created from admin");
        Ok((StatusCode::CREATED, ApiResponse::success(UserRead::from(user))))
    })
    .await
}

#[utoipa::path(
    get,
    path = "/admin/api/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = ApiResponse<UserRead>),
        (status = 403, description = "Not a superuser"),
        (status = 404, description = "No such user")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn get_user(
    deps: Inject<(CurrentSuperuser, DbSession)>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<UserRead>, AppError> {
    deps.run(|(_admin, db)| async move {
        let user = accounts::find_by_id(&*db, id).await?;
        Ok(ApiResponse::success(UserRead::from(user)))
    })
    .await
}

#[utoipa::path(
    patch,
    path = "/admin/api/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated user", body = ApiResponse<UserRead>),
        (status = 400, description = "UPDATE_USER_EMAIL_ALREADY_EXISTS or UPDATE_USER_INVALID_PASSWORD"),
        (status = 403, description = "Not a superuser"),
        (status = 404, description = "No such user")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn update_user(
    deps: Inject<(CurrentSuperuser, DbSession, Settings)>,
    Path(id): Path<i32>,
    Json(payload): Json<UserUpdate>,
) -> Result<ApiResponse<UserRead>, AppError> {
    deps.run(|(admin, db, settings)| async move {
        let existing = accounts::find_by_id(&*db, id).await?;
        let updated =
            accounts::update_user(&*db, existing, payload, settings.min_password_length).await?;
        tracing::info!(admin_id = admin.id, user_id = updated.id, "user edited from admin");
        Ok(ApiResponse::success(UserRead::from(updated)))
    })
    .await
}
