use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put, MethodRouter};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use url::Url;

use crate::api::routes::{route_catalog, HttpMethod, RouteDefinition};
use crate::api::{commands, sessions};
use crate::config::AppConfig;
use crate::pipeline::http::HttpTransformService;
use crate::pipeline::transform::{SharedAnalysisService, SharedTransformService};
use crate::session::store::SessionStore;
use crate::session::SessionOptions;

#[derive(Clone)]
pub struct AppState {
    pub service_name: &'static str,
    pub service_version: &'static str,
    pub started_unix_ms: u128,
    pub route_count: usize,
    pub sessions: SessionStore,
    pub transforms: SharedTransformService,
    pub analysis: SharedAnalysisService,
    pub http: reqwest::Client,
    pub media_base: Url,
    pub fetch_timeout: Duration,
    pub session_options: SessionOptions,
}

impl AppState {
    pub fn new(
        transforms: SharedTransformService,
        analysis: SharedAnalysisService,
        media_base: Url,
        session_options: SessionOptions,
    ) -> Self {
        Self {
            service_name: "fixpix-session-core",
            service_version: env!("CARGO_PKG_VERSION"),
            started_unix_ms: now_unix_ms(),
            route_count: route_catalog().len(),
            sessions: SessionStore::default(),
            transforms,
            analysis,
            http: reqwest::Client::new(),
            media_base,
            fetch_timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
            session_options,
        }
    }

    /// Wires the HTTP transform client from resolved configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let http = reqwest::Client::new();
        let remote = Arc::new(HttpTransformService::new(
            http.clone(),
            config.transform.base_url.clone(),
            config.transform.endpoints.clone(),
            config.transform.timeout(),
        ));
        let mut state = Self::new(
            remote.clone(),
            remote,
            config.transform.media_url.clone(),
            config.session,
        );
        state.http = http;
        state.fetch_timeout = config.transform.timeout();
        state
    }
}

pub fn build_router(config: &AppConfig) -> Router {
    build_router_with_state(AppState::from_config(config))
}

pub fn build_router_with_state(state: AppState) -> Router {
    let mut router = Router::new();
    for route in route_catalog() {
        match method_router_for(route) {
            Some(handler) => router = router.route(route.path, handler),
            None => warn!(method = %route.method, path = route.path, "cataloged route has no handler"),
        }
    }
    router.layer(TraceLayer::new_for_http()).with_state(state)
}

pub async fn serve(config: AppConfig) -> std::io::Result<()> {
    let addr: SocketAddr = config
        .bind
        .parse()
        .map_err(|e| std::io::Error::other(format!("invalid bind address '{}': {e}", config.bind)))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = build_router(&config);
    info!(
        bind = %addr,
        transform_base = %config.transform.base_url,
        "starting fixpix-session-core HTTP surface"
    );
    axum::serve(listener, app).await
}

fn method_router_for(route: RouteDefinition) -> Option<MethodRouter<AppState>> {
    let handler = match (route.method, route.path) {
        (HttpMethod::Get, "/health") => get(health_handler),
        (HttpMethod::Get, "/api/commands") => get(commands::list_commands_handler),
        (HttpMethod::Post, "/api/sessions") => post(sessions::create_session_handler),
        (HttpMethod::Get, "/api/sessions/{id}") => get(sessions::get_session_handler),
        (HttpMethod::Delete, "/api/sessions/{id}") => delete(sessions::delete_session_handler),
        (HttpMethod::Post, "/api/sessions/{id}/settings") => post(sessions::update_settings_handler),
        (HttpMethod::Post, "/api/sessions/{id}/queue/toggle") => post(sessions::toggle_queued_handler),
        (HttpMethod::Post, "/api/sessions/{id}/queue/clear") => post(sessions::clear_queue_handler),
        (HttpMethod::Post, "/api/sessions/{id}/recipes/{recipeId}") => {
            post(sessions::apply_recipe_handler)
        }
        (HttpMethod::Post, "/api/sessions/{id}/commit") => post(sessions::commit_handler),
        (HttpMethod::Post, "/api/sessions/{id}/replay") => post(sessions::replay_handler),
        (HttpMethod::Post, "/api/sessions/{id}/cancel") => post(sessions::cancel_handler),
        (HttpMethod::Post, "/api/sessions/{id}/undo") => post(sessions::undo_handler),
        (HttpMethod::Post, "/api/sessions/{id}/redo") => post(sessions::redo_handler),
        (HttpMethod::Post, "/api/sessions/{id}/history/jump") => post(sessions::jump_handler),
        (HttpMethod::Post, "/api/sessions/{id}/mode") => post(sessions::enter_mode_handler),
        (HttpMethod::Delete, "/api/sessions/{id}/mode") => delete(sessions::exit_mode_handler),
        (HttpMethod::Put, "/api/sessions/{id}/mask") => put(sessions::set_mask_handler),
        (HttpMethod::Delete, "/api/sessions/{id}/mask") => delete(sessions::clear_mask_handler),
        (HttpMethod::Post, "/api/sessions/{id}/analyze") => post(sessions::analyze_handler),
        (HttpMethod::Post, "/api/sessions/{id}/insights/apply") => {
            post(sessions::apply_recommendations_handler)
        }
        (HttpMethod::Get, "/api/sessions/{id}/result") => get(sessions::get_result_handler),
        (HttpMethod::Get, "/api/sessions/{id}/events") => get(sessions::session_events_handler),
        _ => return None,
    };
    Some(handler)
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "status": "ok",
            "service": state.service_name,
            "version": state.service_version,
            "started_unix_ms": state.started_unix_ms,
            "route_count": state.route_count,
            "sessions": state.sessions.len().await,
        })),
    )
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::{RouteDomain, ROUTES};

    #[test]
    fn every_catalog_route_has_a_handler() {
        for route in route_catalog() {
            assert!(
                method_router_for(route).is_some(),
                "{} {} has no handler",
                route.method,
                route.path
            );
        }
        assert_eq!(route_catalog().len(), ROUTES.len());
    }

    #[test]
    fn uncataloged_paths_have_no_handler() {
        let route = RouteDefinition {
            method: HttpMethod::Get,
            path: "/api/sessions/{id}/export",
            domain: RouteDomain::Sessions,
        };
        assert!(method_router_for(route).is_none());
    }
}
