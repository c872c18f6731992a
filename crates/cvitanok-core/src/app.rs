use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use axum::routing::get;
use sea_orm_migration::MigratorTrait;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa_scalar::{Scalar, Servable};

use crate::cache::CacheService;
use crate::config::Config;
use crate::controllers::AppState;
use crate::db::DatabasePool;
use crate::deps::{self, Services};
use crate::migrations::Migrator;
use crate::provider::{BoxError, Capability, Dispatcher, Factory, OverrideTable, Registry};
use crate::routing;
use crate::tasks::{TaskQueue, TaskRegistry};
use crate::templates::Templates;

/// The Cvitanok application: configuration, shared services and the
/// provider registry every request resolves against.
pub struct App {
    pub config: Arc<Config>,
    pub pool: DatabasePool,
    pub cache: CacheService,
    pub tasks: TaskQueue,
    registry: Registry,
    overrides: OverrideTable,
    templates: Templates,
    custom_routes: Vec<Router<AppState>>,
}

impl App {
    /// Create the application from environment variables.
    pub async fn new() -> Result<Self, BoxError> {
        let config = Config::from_env()?;
        Self::with_config(config).await
    }

    /// Create the application with a given config.
    ///
    /// Runs pending migrations when `auto_migrate` is set; otherwise the
    /// database is not contacted until a request needs a session.
    pub async fn with_config(config: Config) -> Result<Self, BoxError> {
        let config = Arc::new(config);
        let pool = DatabasePool::new(config.clone());

        if config.auto_migrate {
            let conn = pool.get().await?;
            tracing::info!("running pending database migrations");
            Migrator::up(&conn, None).await?;
            tracing::info!("migrations complete");
        }

        let cache = CacheService::connect(config.redis_url.as_deref()).await;
        let results = CacheService::connect(config.task_result_backend.as_deref()).await;
        let tasks = TaskQueue::start(TaskRegistry::builtin(), results, &config.task_broker_url);

        let services = Services {
            config: config.clone(),
            pool: pool.clone(),
            cache: cache.clone(),
            tasks: tasks.clone(),
        };
        let registry = deps::build_registry(&services)?;
        registry.validate(deps::ROUTE_CAPABILITIES)?;

        Ok(App {
            config,
            pool,
            cache,
            tasks,
            registry,
            overrides: OverrideTable::new(),
            templates: Templates::new()?,
            custom_routes: Vec::new(),
        })
    }

    /// Install the production provider of `C`, replacing a built-in one.
    pub fn provide<C: Capability>(mut self, factory: Factory<C>) -> Self {
        self.registry.replace(factory);
        self
    }

    /// Merge additional routes. Their handlers can use
    /// [`Inject`](crate::extractors::Inject) like the built-in ones.
    pub fn routes(mut self, router: Router<AppState>) -> Self {
        self.custom_routes.push(router);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The override table consulted before the registry. Shared by every
    /// dispatcher this app hands out.
    pub fn overrides(&self) -> &OverrideTable {
        &self.overrides
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::with_overrides(self.registry.clone(), self.overrides.clone())
    }

    pub fn state(&self) -> AppState {
        AppState {
            config: self.config.clone(),
            dispatcher: self.dispatcher(),
            templates: self.templates.clone(),
        }
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        let state = self.state();
        let openapi = crate::openapi::api_doc(&self.config);
        let openapi_json = openapi.clone();
        let json_path = format!("{}/openapi.json", self.config.api_v1_prefix);

        let mut router = routing::build_routes(&self.config.api_v1_prefix);
        for custom in &self.custom_routes {
            router = router.merge(custom.clone());
        }

        let mut router = router
            .with_state(state)
            .merge(Scalar::with_url("/docs", openapi))
            .route(
                &json_path,
                get(move || {
                    let doc = openapi_json.clone();
                    async move { axum::Json(doc) }
                }),
            )
            .nest_service("/static", ServeDir::new(&self.config.static_dir))
            .layer(cors_layer(&self.config.cors_origins));

        // Request ids and per-request traces only in development.
        if self.config.is_dev() {
            use tower_http::LatencyUnit;
            use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse};

            let x_request_id = HeaderName::from_static(crate::provider::context::REQUEST_ID_HEADER);
            router = router
                .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                        .on_request(DefaultOnRequest::new().level(tracing::Level::INFO))
                        .on_response(
                            DefaultOnResponse::new()
                                .level(tracing::Level::INFO)
                                .latency_unit(LatencyUnit::Millis),
                        ),
                )
                .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));
        }

        router
    }

    /// Serve until Ctrl+C.
    pub async fn run(self) -> Result<(), BoxError> {
        let addr = self.config.server_addr();
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(
            "{} running on http://{} (docs at /docs, environment: {})",
            self.config.project_name,
            addr,
            self.config.environment
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

/// Credentials are allowed, so `*` mirrors the request origin instead of
/// sending a literal wildcard.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin.trim_end_matches('/')) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(%origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
