use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::ConfigError;
use crate::provider::ProviderError;
use crate::response::ApiResponse;
use crate::tasks::TaskError;

/// Machine-readable reasons for rejected auth and user requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    RegisterUserAlreadyExists,
    RegisterInvalidPassword,
    LoginBadCredentials,
    ResetPasswordBadToken,
    ResetPasswordInvalidPassword,
    VerifyUserBadToken,
    VerifyUserAlreadyVerified,
    UpdateUserEmailAlreadyExists,
    UpdateUserInvalidPassword,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::RegisterUserAlreadyExists => "REGISTER_USER_ALREADY_EXISTS",
            ErrorCode::RegisterInvalidPassword => "REGISTER_INVALID_PASSWORD",
            ErrorCode::LoginBadCredentials => "LOGIN_BAD_CREDENTIALS",
            ErrorCode::ResetPasswordBadToken => "RESET_PASSWORD_BAD_TOKEN",
            ErrorCode::ResetPasswordInvalidPassword => "RESET_PASSWORD_INVALID_PASSWORD",
            ErrorCode::VerifyUserBadToken => "VERIFY_USER_BAD_TOKEN",
            ErrorCode::VerifyUserAlreadyVerified => "VERIFY_USER_ALREADY_VERIFIED",
            ErrorCode::UpdateUserEmailAlreadyExists => "UPDATE_USER_EMAIL_ALREADY_EXISTS",
            ErrorCode::UpdateUserInvalidPassword => "UPDATE_USER_INVALID_PASSWORD",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error returned by handlers and factories.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{code}: {message}")]
    Rejected { code: ErrorCode, message: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Validation errors")]
    ValidationErrors(Vec<FieldError>),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Provider(ProviderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error(transparent)]
    Task(#[from] TaskError),
}

impl AppError {
    /// A 400 carrying one of the [`ErrorCode`]s.
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        AppError::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Rejected { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::ValidationErrors(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Provider(ProviderError::ResourceUnavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Task(err) => err.status_code(),
            AppError::Internal(_)
            | AppError::Database(_)
            | AppError::Config(_)
            | AppError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Rejected { code, .. } => code.as_str(),
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Validation(_) | AppError::ValidationErrors(_) => "VALIDATION_ERROR",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Provider(ProviderError::ResourceUnavailable { .. }) => "RESOURCE_UNAVAILABLE",
            AppError::Provider(ProviderError::UnresolvedDependency { .. }) => "UNRESOLVED_DEPENDENCY",
            AppError::Provider(_) => "PROVIDER_MISCONFIGURED",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Template(_) => "TEMPLATE_ERROR",
            AppError::Task(err) => err.error_code(),
        }
    }

    /// Create a validation error with field-level details.
    pub fn validation_fields(errors: Vec<FieldError>) -> Self {
        AppError::ValidationErrors(errors)
    }
}

/// Factories fail with a boxed error; when that error is an [`AppError`]
/// (a 401 from the current-user factory, say) it is surfaced unchanged.
impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::ResourceUnavailable { key, source } => {
                match source.downcast::<AppError>() {
                    Ok(app) => *app,
                    Err(source) => {
                        AppError::Provider(ProviderError::ResourceUnavailable { key, source })
                    }
                }
            }
            other => AppError::Provider(other),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |err| {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("invalid {field}"));
                    FieldError::with_code(field.to_string(), message, err.code.to_string())
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::ValidationErrors(fields)
    }
}

/// Error detail for API responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

/// Field-level validation error.
///
/// ```json
/// {
///   "field": "email",
///   "message": "must be a valid email address",
///   "code": "email"
/// }
/// ```
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        FieldError {
            field: field.into(),
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        FieldError {
            field: field.into(),
            message: message.into(),
            code: Some(code.into()),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }

        let fields = match &self {
            AppError::ValidationErrors(errs) => Some(errs.clone()),
            _ => None,
        };
        let message = match &self {
            AppError::ValidationErrors(errs) => errs
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join("; "),
            AppError::Rejected { message, .. } => message.clone(),
            // Storage and provider internals stay in the logs.
            AppError::Database(_) => "Database error".to_string(),
            AppError::Provider(err) if !err.is_misconfiguration() => {
                format!("Resource `{}` is unavailable", err.key())
            }
            _ => self.to_string(),
        };
        let body: ApiResponse<()> = ApiResponse::error(ErrorDetail {
            code: self.error_code().to_string(),
            message,
            fields,
        });

        (status, axum::Json(body)).into_response()
    }
}
