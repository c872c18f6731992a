use axum::{Form, Router, http::StatusCode, routing::post};
use sea_orm::{ActiveModelTrait, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::accounts;
use crate::auth::{check_password_policy, create_access_token, jwt};
use crate::deps::{CurrentActiveUser, DbSession, Settings};
use crate::error::{AppError, ErrorCode};
use crate::extractors::{Inject, Json};
use crate::models::user::{UserCreate, UserRead};
use crate::response::MessageResponse;

use super::AppState;

// ── Request / Response types ──

/// OAuth2 password form: `username` carries the email.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BearerResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailPayload {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordPayload {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyPayload {
    pub token: String,
}

// ── Routes ──

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/jwt/login", post(login))
        .route("/jwt/logout", post(logout))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/request-verify-token", post(request_verify_token))
        .route("/verify", post(verify))
}

// ── Handlers ──

/// Register a new user.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User created", body = UserRead),
        (status = 400, description = "REGISTER_USER_ALREADY_EXISTS or REGISTER_INVALID_PASSWORD"),
        (status = 422, description = "Malformed payload")
    ),
    tag = "auth"
)]
pub async fn register(
    deps: Inject<(DbSession, Settings)>,
    Json(payload): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserRead>), AppError> {
    deps.run(|(db, settings)| async move {
        let user =
            accounts::create_user(&*db, payload, settings.min_password_length, true).await?;
        Ok((StatusCode::CREATED, Json(UserRead::from(user))))
    })
    .await
}

/// Exchange credentials for a bearer token.
#[utoipa::path(
    post,
    path = "/auth/jwt/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Logged in", body = BearerResponse),
        (status = 400, description = "LOGIN_BAD_CREDENTIALS")
    ),
    tag = "auth"
)]
pub async fn login(
    deps: Inject<(DbSession, Settings)>,
    Form(form): Form<LoginForm>,
) -> Result<Json<BearerResponse>, AppError> {
    deps.run(|(db, settings)| async move {
        let user = accounts::authenticate(&*db, &form.username, &form.password)
            .await?
            .ok_or_else(|| {
                AppError::rejected(ErrorCode::LoginBadCredentials, "Bad credentials")
            })?;

        tracing::info!(user_id = user.id, "user logged in");
        Ok(Json(BearerResponse {
            access_token: create_access_token(user.id, &settings)?,
            token_type: "bearer".to_string(),
        }))
    })
    .await
}

/// Log out. Tokens are stateless, so this only checks the caller is
/// logged in; clients drop the token.
#[utoipa::path(
    post,
    path = "/auth/jwt/logout",
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Not logged in")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout(deps: Inject<(CurrentActiveUser,)>) -> Result<StatusCode, AppError> {
    deps.run(|(user,)| async move {
        tracing::info!(user_id = user.id, "user logged out");
        Ok(StatusCode::NO_CONTENT)
    })
    .await
}

/// Start a password reset. Always 202, whether or not the email is known.
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = EmailPayload,
    responses((status = 202, description = "Reset token issued if the user exists")),
    tag = "auth"
)]
pub async fn forgot_password(
    deps: Inject<(DbSession, Settings)>,
    Json(payload): Json<EmailPayload>,
) -> Result<StatusCode, AppError> {
    deps.run(|(db, settings)| async move {
        if let Some(user) = accounts::find_by_email(&*db, &payload.email).await? {
            if user.is_active {
                let token = jwt::create_reset_token(&user, &settings)?;
                // Delivery is left to the application; the token is logged instead.
                tracing::debug!(user_id = user.id, %token, "password reset requested");
            }
        }
        Ok(StatusCode::ACCEPTED)
    })
    .await
}

/// Set a new password with a reset token.
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordPayload,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "RESET_PASSWORD_BAD_TOKEN or RESET_PASSWORD_INVALID_PASSWORD")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    deps: Inject<(DbSession, Settings)>,
    Json(payload): Json<ResetPasswordPayload>,
) -> Result<Json<MessageResponse>, AppError> {
    deps.run(|(db, settings)| async move {
        let bad_token =
            || AppError::rejected(ErrorCode::ResetPasswordBadToken, "Invalid reset token");

        let claims = jwt::validate_reset_token(&payload.token, &settings)?;
        let user_id = claims.user_id().ok_or_else(bad_token)?;
        let user = match accounts::find_by_id(&*db, user_id).await {
            Ok(user) if user.is_active => user,
            Ok(_) | Err(AppError::NotFound(_)) => return Err(bad_token()),
            Err(e) => return Err(e),
        };
        if claims.password_fgpt.as_deref() != Some(jwt::password_fingerprint(&user.hashed_password).as_str()) {
            return Err(bad_token());
        }

        check_password_policy(&payload.password, &user.email, settings.min_password_length)
            .map_err(|reason| AppError::rejected(ErrorCode::ResetPasswordInvalidPassword, reason))?;
        let user = accounts::set_password(&*db, user, &payload.password).await?;

        tracing::info!(user_id = user.id, "password reset");
        Ok(Json(MessageResponse::new("Password has been reset")))
    })
    .await
}

/// Issue an email verification token. Always 202.
#[utoipa::path(
    post,
    path = "/auth/request-verify-token",
    request_body = EmailPayload,
    responses((status = 202, description = "Verification token issued if applicable")),
    tag = "auth"
)]
pub async fn request_verify_token(
    deps: Inject<(DbSession, Settings)>,
    Json(payload): Json<EmailPayload>,
) -> Result<StatusCode, AppError> {
    deps.run(|(db, settings)| async move {
        if let Some(user) = accounts::find_by_email(&*db, &payload.email).await? {
            if user.is_active && !user.is_verified {
                let token = jwt::create_verify_token(&user, &settings)?;
                tracing::debug!(user_id = user.id, %token, "verification requested");
            }
        }
        Ok(StatusCode::ACCEPTED)
    })
    .await
}

/// Mark the user of a verification token as verified.
#[utoipa::path(
    post,
    path = "/auth/verify",
    request_body = VerifyPayload,
    responses(
        (status = 200, description = "User verified", body = UserRead),
        (status = 400, description = "VERIFY_USER_BAD_TOKEN or VERIFY_USER_ALREADY_VERIFIED")
    ),
    tag = "auth"
)]
pub async fn verify(
    deps: Inject<(DbSession, Settings)>,
    Json(payload): Json<VerifyPayload>,
) -> Result<Json<UserRead>, AppError> {
    deps.run(|(db, settings)| async move {
        let bad_token =
            || AppError::rejected(ErrorCode::VerifyUserBadToken, "Invalid verification token");

        let claims = jwt::validate_verify_token(&payload.token, &settings)?;
        let (Some(user_id), Some(email)) = (claims.user_id(), claims.email.as_deref()) else {
            return Err(bad_token());
        };
        let user = match accounts::find_by_id(&*db, user_id).await {
            Ok(user) if user.email == email => user,
            Ok(_) | Err(AppError::NotFound(_)) => return Err(bad_token()),
            Err(e) => return Err(e),
        };
        if user.is_verified {
            return Err(AppError::rejected(
                ErrorCode::VerifyUserAlreadyVerified,
                "User is already verified",
            ));
        }

        let mut model: crate::models::user::ActiveModel = user.into();
        model.is_verified = Set(true);
        model.updated_at = Set(chrono::Utc::now().naive_utc());
        let user = model.update(&*db).await?;

        tracing::info!(user_id = user.id, "user verified");
        Ok(Json(UserRead::from(user)))
    })
    .await
}
