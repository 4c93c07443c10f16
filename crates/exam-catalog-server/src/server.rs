// crates/exam-catalog-server/src/server.rs
// ============================================================================
// Module: Catalog HTTP Server
// Description: Store selection, router assembly, and the serve loop.
// Purpose: Expose the catalog service over JSON/HTTP.
// Dependencies: axum, tokio, exam-catalog-{core,config,store-sqlite,store-postgres}
// ============================================================================

//! ## Overview
//! [`CatalogServer`] wires a [`CatalogService`] behind an axum router. Every
//! request passes the rate limiter, then bearer auth, then CSRF verification
//! for mutating methods, before reaching a handler. Store construction is
//! blocking and runs off the async workers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::Request;
use axum::extract::State;
use axum::middleware::Next;
use axum::middleware::from_fn_with_state;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use exam_catalog_config::AuditConfig;
use exam_catalog_config::AuthMode;
use exam_catalog_config::CatalogConfig;
use exam_catalog_config::DatabaseConfig;
use exam_catalog_config::DatabaseDriver;
use exam_catalog_core::CatalogService;
use exam_catalog_core::SharedCatalogStore;
use exam_catalog_core::WriteAuditSink;
use exam_catalog_core::runtime::FileAuditSink;
use exam_catalog_core::runtime::NoopAuditSink;
use exam_catalog_core::runtime::TracingAuditSink;
use exam_catalog_store_postgres::PostgresCatalogStore;
use exam_catalog_store_sqlite::SqliteCatalogStore;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::auth::AuthPolicy;
use crate::auth::is_safe_method;
use crate::csrf::CsrfGuard;
use crate::rate_limit::RateLimiter;
use crate::routes;

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared handler state.
pub struct AppState {
    /// Catalog read and write pipelines.
    pub(crate) service: CatalogService,
    /// Bearer token policy.
    pub(crate) auth: AuthPolicy,
    /// CSRF token store.
    pub(crate) csrf: CsrfGuard,
    /// Optional per-peer limiter.
    pub(crate) rate_limiter: Option<RateLimiter>,
    /// Request body limit in bytes.
    pub(crate) max_body_bytes: usize,
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP front end for the catalog.
pub struct CatalogServer {
    /// Resolved configuration.
    config: CatalogConfig,
    /// Handler state.
    state: Arc<AppState>,
}

impl CatalogServer {
    /// Builds a server around an existing service.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] when the CSRF header is invalid.
    pub fn new(config: CatalogConfig, service: CatalogService) -> Result<Self, ServerError> {
        let server = &config.server;
        let state = AppState {
            service,
            auth: AuthPolicy::from_config(&server.auth),
            csrf: CsrfGuard::from_config(&server.csrf).map_err(ServerError::Config)?,
            rate_limiter: server.rate_limit.as_ref().map(RateLimiter::new),
            max_body_bytes: server.max_body_bytes,
        };
        Ok(Self {
            config,
            state: Arc::new(state),
        })
    }

    /// Opens the configured store and builds the full service stack.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the store or audit sink cannot be opened.
    pub async fn from_config(config: CatalogConfig) -> Result<Self, ServerError> {
        let database = config.database.clone();
        let store = tokio::task::spawn_blocking(move || build_store(&database))
            .await
            .map_err(|err| ServerError::Init(format!("store task failed: {err}")))??;
        let audit = build_audit_sink(&config.server.audit)?;
        let service = CatalogService::new(store, config.service_config()).with_audit(audit);
        Self::new(config, service)
    }

    /// Returns the configured router.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = Arc::clone(&self.state);
        Router::new()
            .route("/healthz", get(routes::healthz))
            .route("/csrf", get(routes::issue_csrf))
            .route(
                "/api/universities",
                get(routes::list_universities).post(routes::create_university),
            )
            .route("/api/universities/search", get(routes::search_universities))
            .route(
                "/api/universities/{uid}",
                get(routes::get_university)
                    .put(routes::update_university)
                    .delete(routes::delete_university),
            )
            .route(
                "/api/universities/{uid}/departments",
                post(routes::create_department),
            )
            .route(
                "/api/universities/{uid}/departments/{did}",
                get(routes::get_department)
                    .put(routes::update_department)
                    .delete(routes::delete_department),
            )
            .route(
                "/api/universities/{uid}/departments/{did}/majors",
                post(routes::create_major),
            )
            .route(
                "/api/universities/{uid}/departments/{did}/majors/{mid}",
                get(routes::get_major).put(routes::update_major).delete(routes::delete_major),
            )
            .route(
                "/api/universities/{uid}/departments/{did}/subjects/batch",
                put(routes::update_subjects_batch),
            )
            .route(
                "/api/universities/{uid}/majors/{mid}/admission-schedules",
                post(routes::create_admission_schedule),
            )
            .route(
                "/api/universities/{uid}/majors/{mid}/admission-schedules/{sid}",
                get(routes::get_admission_schedule)
                    .put(routes::update_admission_schedule)
                    .delete(routes::delete_admission_schedule),
            )
            .route(
                "/api/universities/{uid}/admission-schedules/{sid}/info",
                post(routes::create_admission_info),
            )
            .route(
                "/api/universities/{uid}/admission-schedules/{sid}/info/{iid}",
                get(routes::get_admission_info)
                    .put(routes::update_admission_info)
                    .delete(routes::delete_admission_info),
            )
            .route(
                "/api/universities/{uid}/admission-schedules/{sid}/test-types",
                post(routes::create_test_type),
            )
            .route(
                "/api/universities/{uid}/admission-schedules/{sid}/test-types/{tid}",
                get(routes::get_test_type)
                    .put(routes::update_test_type)
                    .delete(routes::delete_test_type),
            )
            .route(
                "/api/universities/{uid}/test-types/{tid}/subjects",
                post(routes::create_subject),
            )
            .route(
                "/api/universities/{uid}/test-types/{tid}/subjects/{subid}",
                get(routes::get_subject).put(routes::update_subject).delete(routes::delete_subject),
            )
            .route(
                "/api/filter-options",
                get(routes::list_filter_options).post(routes::create_filter_option),
            )
            .layer(from_fn_with_state(Arc::clone(&state), guard_request))
            .layer(DefaultBodyLimit::max(self.state.max_body_bytes))
            .with_state(state)
    }

    /// Binds the configured address and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr =
            self.config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| ServerError::Transport(format!("bind {addr} failed: {err}")))?;
        self.serve_with_listener(listener, shutdown_signal()).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when the listener fails.
    pub async fn serve_with_listener<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener
            .local_addr()
            .map_err(|err| ServerError::Transport(format!("listener address: {err}")))?;
        warn_if_open(&self.config, local);
        tracing::info!(
            addr = %local,
            environment = self.config.server.environment.as_str(),
            driver = self.config.database.driver.as_str(),
            "exam catalog listening"
        );
        let app = self.router();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))?;
        tracing::info!("exam catalog stopped");
        Ok(())
    }
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Applies rate limiting, authentication, and CSRF verification.
async fn guard_request(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    if let Some(limiter) = &state.rate_limiter
        && let Some(ConnectInfo(peer)) = req.extensions().get::<ConnectInfo<SocketAddr>>()
        && let Err(error) = limiter.check(peer.ip())
    {
        return error.into_response();
    }
    if req.uri().path() == "/healthz" {
        return next.run(req).await;
    }
    if let Err(error) = state.auth.authorize(req.method(), req.headers()) {
        return error.into_response();
    }
    if !is_safe_method(req.method())
        && let Err(error) = state.csrf.verify(req.headers())
    {
        tracing::debug!(method = %req.method(), path = req.uri().path(), "csrf rejected");
        return error.into_response();
    }
    next.run(req).await
}

// ============================================================================
// SECTION: Construction Helpers
// ============================================================================

/// Opens the configured catalog store. Blocking.
///
/// # Errors
///
/// Returns [`ServerError::Store`] when the store cannot be opened.
pub fn build_store(config: &DatabaseConfig) -> Result<SharedCatalogStore, ServerError> {
    match config.driver {
        DatabaseDriver::Sqlite => {
            let store = SqliteCatalogStore::new(config.sqlite_store_config())
                .map_err(|err| ServerError::Store(err.to_string()))?;
            Ok(Arc::new(store))
        }
        DatabaseDriver::Postgres => {
            let store = PostgresCatalogStore::new(config.postgres_store_config())
                .map_err(|err| ServerError::Store(err.to_string()))?;
            Ok(Arc::new(store))
        }
    }
}

/// Builds the configured write audit sink.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the audit file cannot be opened.
pub fn build_audit_sink(config: &AuditConfig) -> Result<Arc<dyn WriteAuditSink>, ServerError> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => {
            let sink = FileAuditSink::new(std::path::Path::new(path))
                .map_err(|err| ServerError::Init(format!("audit log {path}: {err}")))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(TracingAuditSink)),
    }
}

/// Warns when an open server listens beyond loopback.
fn warn_if_open(config: &CatalogConfig, local: SocketAddr) {
    if config.server.auth.mode == AuthMode::Open && !local.ip().is_loopback() {
        tracing::warn!(
            addr = %local,
            "server is reachable without authentication; set AUTH_MODE=bearer_token"
        );
    }
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("ctrl-c handler unavailable; serving until the process exits");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server construction and transport errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Store could not be opened.
    #[error("store error: {0}")]
    Store(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}
