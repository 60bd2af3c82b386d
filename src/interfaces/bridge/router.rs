use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::BridgeState;
use super::auth;
use super::handlers::{health, oauth, secrets};

fn build_localhost_cors(ui_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", ui_port),
        format!("http://localhost:{}", ui_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

/// The complete, enumerable capability surface. Anything not routed here is
/// unreachable from the UI by construction.
pub fn build_bridge_router(state: BridgeState, ui_port: u16) -> Router {
    Router::new()
        .route(
            "/bridge/secrets",
            get(secrets::list_secrets).post(secrets::set_secret),
        )
        .route(
            "/bridge/secrets/{key}",
            get(secrets::get_secret).delete(secrets::delete_secret),
        )
        .route("/bridge/health", get(health::check_health))
        .route("/bridge/oauth/{provider}", post(oauth::open_oauth))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bridge_token,
        ))
        .layer(build_localhost_cors(ui_port))
        .with_state(state)
}
