use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::BridgeState;

/// Gate every bridge call on the per-run token. The UI renderer is treated as
/// compromised: knowing the loopback port is not enough to reach privileged
/// operations.
pub async fn require_bridge_token(
    State(state): State<BridgeState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let presented = req
        .headers()
        .get("x-bridge-token")
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(token) if token == state.bridge_token => next.run(req).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "Missing or invalid bridge token"
            })),
        )
            .into_response(),
    }
}
