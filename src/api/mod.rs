use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};

use crate::config::Config;
use crate::services::{AuthService, CloudDispatcher, IdentityResolver, InventoryService};
use crate::state::SharedState;
use crate::vault::CredentialVault;

pub mod auth;
mod azure;
mod error;
mod inventory;
mod observability;
mod provider;
mod system;
mod types;
mod users;
mod validation;

pub use error::ApiError;
pub use types::*;

pub const SESSION_COOKIE_NAME: &str = "cloudvalet_session";

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth_service(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn identity(&self) -> &IdentityResolver {
        &self.shared.identity
    }

    #[must_use]
    pub fn inventory(&self) -> &Arc<dyn InventoryService> {
        &self.shared.inventory_service
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<CloudDispatcher> {
        &self.shared.dispatcher
    }

    #[must_use]
    pub fn vault(&self) -> &Arc<CredentialVault> {
        &self.shared.vault
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub async fn router(state: Arc<AppState>) -> Router {
    let (cors_origins, secure_cookies, inactivity_minutes) = {
        let config = state.config().read().await;
        (
            config.server.cors_allowed_origins.clone(),
            config.server.secure_cookies,
            config.server.session_inactivity_minutes,
        )
    };

    let protected_routes = create_protected_router(state.clone());

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE_NAME)
        .with_secure(secure_cookies)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            inactivity_minutes,
        )));

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/register", post(auth::register))
        .layer(session_layer)
        .with_state(state);

    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true)
    }
    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
    .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(system::root))
        .nest("/api", api_router)
        .layer(middleware::from_fn(observability::security_headers_middleware))
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/password", put(auth::change_password))
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/{username}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/{username}/groups", get(users::list_user_groups))
        .route(
            "/users/{username}/groups/{group}",
            put(users::add_to_group).delete(users::remove_from_group),
        )
        .route(
            "/groups",
            get(inventory::list_groups).post(inventory::create_group),
        )
        .route("/groups/{name}", delete(inventory::delete_group))
        .route("/groups/{name}/members", get(inventory::group_members))
        .route("/tags", get(inventory::list_tags).post(inventory::create_tag))
        .route("/tags/{name}", delete(inventory::delete_tag))
        .route("/vms", get(inventory::list_vms).post(inventory::create_vm))
        .route("/vms/{name}", delete(inventory::delete_vm))
        .route("/vms/{name}/tags", get(inventory::list_vm_tags))
        .route(
            "/vms/{name}/tags/{tag}",
            put(inventory::tag_vm).delete(inventory::untag_vm),
        )
        .route("/azure/vms", get(azure::list_vms))
        .route("/azure/vm/action", post(azure::vm_action))
        .route("/azure/vms/bulk_action", post(azure::bulk_action))
        .route(
            "/provider/azure",
            get(provider::get_azure_credential).put(provider::save_azure_credential),
        )
        .route("/system/health", get(system::health))
        .route("/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
