use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::super::BridgeState;
use crate::core::oauth::Provider;

/// `oauth.open`: validated provider in, `{success, provider}` out. Broker
/// failures come back as result variants, never as opaque errors.
pub async fn open_oauth(Path(provider): Path<String>, State(state): State<BridgeState>) -> Response {
    let provider: Provider = match provider.parse() {
        Ok(provider) => provider,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "success": false, "error": e.to_string() })),
            )
                .into_response();
        }
    };

    match state.broker.open(provider).await {
        Ok(_payload) => Json(serde_json::json!({
            "success": true,
            "provider": provider.as_str(),
        }))
        .into_response(),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "provider": provider.as_str(),
            "error": e.to_string(),
        }))
        .into_response(),
    }
}
