// Application state, store selection and the router

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::accounts::{AccountService, AccountSettings};
use crate::auth::{Authenticator, CredentialVerifier, IntrospectionVerifier, JwtVerifier, VerificationCache};
use crate::config::AppConfig;
use crate::handlers::{protected, public};
use crate::mediator::Mediator;
use crate::resources::ResourceRegistry;
use crate::store::{postgres::redact, DocumentStore, MemoryDocumentStore, PgDocumentStore};

/// Shared per-process state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub mediator: Arc<Mediator>,
    pub config: Arc<AppConfig>,
    /// Password login and registration; absent when tokens come from an
    /// external issuer or no `users` resource is defined
    pub accounts: Option<Arc<AccountService>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        registry: ResourceRegistry,
        store: Arc<dyn DocumentStore>,
    ) -> anyhow::Result<Self> {
        let authenticator = build_authenticator(&config)?;
        let accounts = build_accounts(&config, &registry, store.clone())?;
        let mediator = Mediator::new(Arc::new(registry), Arc::new(authenticator), store)
            .with_storage_policy(config.storage_policy())
            .with_filter_options(config.filter_options());

        Ok(Self {
            mediator: Arc::new(mediator),
            config: Arc::new(config),
            accounts: accounts.map(Arc::new),
        })
    }
}

pub fn build_accounts(
    config: &AppConfig,
    registry: &ResourceRegistry,
    store: Arc<dyn DocumentStore>,
) -> anyhow::Result<Option<AccountService>> {
    if config.auth.introspection_url.is_some() {
        info!("Password accounts disabled: tokens are issued externally");
        return Ok(None);
    }
    let settings = AccountSettings::from_config(config)?;
    let accounts = AccountService::new(registry, store, config.storage_policy(), settings)?;
    if accounts.is_none() {
        warn!("Password accounts disabled: no users resource is defined");
    }
    Ok(accounts)
}

fn build_authenticator(config: &AppConfig) -> anyhow::Result<Authenticator> {
    let verifier: Arc<dyn CredentialVerifier> = match &config.auth.introspection_url {
        Some(raw) => Arc::new(IntrospectionVerifier::new(config.introspection_endpoint(raw)?)),
        None => Arc::new(JwtVerifier::new(&config.auth.jwt_secret, config.jwt_algorithm()?)?),
    };
    info!("Verifying credentials via {}", verifier.name());

    let cache = VerificationCache::new(
        Duration::from_secs(config.auth.cache_ttl_secs),
        config.auth.cache_capacity,
    );
    Ok(Authenticator::new(verifier, Duration::from_millis(config.auth.verify_timeout_ms)).with_cache(cache))
}

/// The configured storage backend, kept so it can be closed on shutdown
pub enum StoreBackend {
    Memory(MemoryDocumentStore),
    Postgres(PgDocumentStore),
}

impl StoreBackend {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let Some(database_url) = &config.storage.database_url else {
            warn!("DATABASE_URL not set, using the in-memory store; documents will not survive a restart");
            return Ok(StoreBackend::Memory(MemoryDocumentStore::new()));
        };

        let store = PgDocumentStore::connect(
            database_url,
            config.storage.max_connections,
            Duration::from_secs(config.storage.connect_timeout_secs),
        )
        .await
        .with_context(|| format!("connecting to {}", redact(database_url)))?;
        store.migrate().await.context("creating the documents table")?;
        Ok(StoreBackend::Postgres(store))
    }

    pub fn shared(&self) -> Arc<dyn DocumentStore> {
        match self {
            StoreBackend::Memory(store) => Arc::new(store.clone()),
            StoreBackend::Postgres(store) => Arc::new(store.clone()),
        }
    }

    pub async fn close(&self) {
        if let StoreBackend::Postgres(store) = self {
            store.close().await;
        }
    }
}

pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let body_limit = state.config.api.max_request_size_bytes;

    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .merge(account_routes(state.accounts.is_some()))
        // Protected API
        .merge(auth_routes())
        .merge(data_routes())
        .merge(find_routes())
        // Global middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn account_routes(enabled: bool) -> Router<AppState> {
    if !enabled {
        return Router::new();
    }
    Router::new()
        .route("/api/auth/login", post(public::auth::login_post))
        .route("/api/auth/register", post(public::auth::register_post))
}

fn auth_routes() -> Router<AppState> {
    Router::new().route("/api/auth/whoami", get(protected::auth::whoami))
}

fn data_routes() -> Router<AppState> {
    use protected::data;

    Router::new()
        // Resource-level operations (collection)
        .route(
            "/api/data/:resource",
            get(data::collection_get).post(data::collection_post),
        )
        // Document-level operations (individual)
        .route(
            "/api/data/:resource/:id",
            get(data::record_get)
                .put(data::record_put)
                .patch(data::record_patch)
                .delete(data::record_delete),
        )
}

fn find_routes() -> Router<AppState> {
    Router::new().route("/api/find/:resource", post(protected::find::find_post))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if !config.security.enable_cors {
        return CorsLayer::new();
    }

    let origins = &config.security.cors_origins;
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}
