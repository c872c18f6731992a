use utoipa::OpenApi;

use crate::accounts::{SortField, SortOrder};
use crate::config::Config;
use crate::controllers::admin::UserPage;
use crate::controllers::api::{HealthResponse, TaskQueued};
use crate::controllers::auth::{
    BearerResponse, EmailPayload, LoginForm, ResetPasswordPayload, VerifyPayload,
};
use crate::controllers::views::WelcomeMessage;
use crate::error::{ErrorDetail, FieldError};
use crate::models::user::{UserCreate, UserRead, UserUpdate};
use crate::response::MessageResponse;
use crate::tasks::{TaskRecord, TaskStatus};

/// OpenAPI description of the built-in routes.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cvitanok",
        description = "Web backend template with request-scoped dependency injection."
    ),
    paths(
        crate::controllers::views::root,
        crate::controllers::api::health,
        crate::controllers::api::protected,
        crate::controllers::api::enqueue_task,
        crate::controllers::api::task_status,
        crate::controllers::auth::register,
        crate::controllers::auth::login,
        crate::controllers::auth::logout,
        crate::controllers::auth::forgot_password,
        crate::controllers::auth::reset_password,
        crate::controllers::auth::request_verify_token,
        crate::controllers::auth::verify,
        crate::controllers::users::get_me,
        crate::controllers::users::update_me,
        crate::controllers::users::get_user,
        crate::controllers::users::update_user,
        crate::controllers::users::delete_user,
        crate::controllers::admin::list_users,
        crate::controllers::admin::create_user,
        crate::controllers::admin::get_user,
        crate::controllers::admin::update_user,
    ),
    components(
        schemas(
            WelcomeMessage,
            HealthResponse,
            MessageResponse,
            TaskQueued,
            TaskRecord,
            TaskStatus,
            LoginForm,
            BearerResponse,
            EmailPayload,
            ResetPasswordPayload,
            VerifyPayload,
            UserCreate,
            UserRead,
            UserUpdate,
            UserPage,
            SortField,
            SortOrder,
            ErrorDetail,
            FieldError,
        )
    ),
    tags(
        (name = "views", description = "Entry points"),
        (name = "api", description = "Versioned API"),
        (name = "tasks", description = "Background tasks"),
        (name = "auth", description = "Registration, login and token flows"),
        (name = "users", description = "User accounts"),
        (name = "admin", description = "Superuser user management")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// The document served at `{api_v1_prefix}/openapi.json`, titled after the
/// configured project.
pub fn api_doc(config: &Config) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = config.project_name.clone();
    doc.info.version = config.version.clone();
    doc
}

/// Registers the `bearer_auth` scheme referenced by protected paths.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/health"));
        assert!(doc.paths.paths.contains_key("/auth/jwt/login"));
        assert!(doc.paths.paths.contains_key("/admin/api/users/{id}"));
        let schemes = &doc.components.as_ref().unwrap().security_schemes;
        assert!(schemes.contains_key("bearer_auth"));
    }
}
