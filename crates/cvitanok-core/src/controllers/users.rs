use axum::{Router, extract::Path, http::StatusCode, routing::get};
use sea_orm::ModelTrait;

use crate::accounts;
use crate::deps::{CurrentActiveUser, CurrentSuperuser, DbSession, Settings};
use crate::error::AppError;
use crate::extractors::{Inject, Json};
use crate::models::user::{UserRead, UserUpdate};

use super::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me).patch(update_me))
        .route("/{id}", get(get_user).patch(update_user).delete(delete_user))
}

/// The authenticated user.
#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Current user", body = UserRead),
        (status = 401, description = "Not logged in or inactive")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn get_me(deps: Inject<(CurrentActiveUser,)>) -> Result<Json<UserRead>, AppError> {
    deps.run(|(user,)| async move { Ok(Json(UserRead::from(&*user))) })
        .await
}

/// Update the authenticated user. Only `email` and `password` are applied.
#[utoipa::path(
    patch,
    path = "/users/me",
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated user", body = UserRead),
        (status = 400, description = "UPDATE_USER_EMAIL_ALREADY_EXISTS or UPDATE_USER_INVALID_PASSWORD"),
        (status = 401, description = "Not logged in or inactive")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn update_me(
    deps: Inject<(CurrentActiveUser, DbSession, Settings)>,
    Json(payload): Json<UserUpdate>,
) -> Result<Json<UserRead>, AppError> {
    deps.run(|(user, db, settings)| async move {
        let updated = accounts::update_user(
            &*db,
            (*user).clone(),
            payload.restricted_to_self(),
            settings.min_password_length,
        )
        .await?;
        Ok(Json(UserRead::from(updated)))
    })
    .await
}

/// Any user by id. Superusers only.
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserRead),
        (status = 403, description = "Not a superuser"),
        (status = 404, description = "No such user")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn get_user(
    deps: Inject<(CurrentSuperuser, DbSession)>,
    Path(id): Path<i32>,
) -> Result<Json<UserRead>, AppError> {
    deps.run(|(_admin, db)| async move {
        let user = accounts::find_by_id(&*db, id).await?;
        Ok(Json(UserRead::from(user)))
    })
    .await
}

/// Update any field of a user. Superusers only.
#[utoipa::path(
    patch,
    path = "/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated user", body = UserRead),
        (status = 400, description = "UPDATE_USER_EMAIL_ALREADY_EXISTS or UPDATE_USER_INVALID_PASSWORD"),
        (status = 403, description = "Not a superuser"),
        (status = 404, description = "No such user")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn update_user(
    deps: Inject<(CurrentSuperuser, DbSession, Settings)>,
    Path(id): Path<i32>,
    Json(payload): Json<UserUpdate>,
) -> Result<Json<UserRead>, AppError> {
    deps.run(|(admin, db, settings)| async move {
        let existing = accounts::find_by_id(&*db, id).await?;
        let updated =
            accounts::update_user(&*db, existing, payload, settings.min_password_length).await?;
        tracing::info!(admin_id = admin.id, user_id = updated.id, "user updated");
        Ok(Json(UserRead::from(updated)))
    })
    .await
}

/// Delete a user. Superusers only.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not a superuser"),
        (status = 404, description = "No such user")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn delete_user(
    deps: Inject<(CurrentSuperuser, DbSession)>,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    deps.run(|(admin, db)| async move {
        let user = accounts::find_by_id(&*db, id).await?;
        user.delete(&*db).await?;
        tracing::info!(admin_id = admin.id, user_id = id, "user deleted");
        Ok(StatusCode::NO_CONTENT)
    })
    .await
}
