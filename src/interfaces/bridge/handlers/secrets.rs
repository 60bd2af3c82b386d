use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::super::BridgeState;

const MAX_KEY_LEN: usize = 256;
const MAX_VALUE_LEN: usize = 64 * 1024;

/// Keys arrive from a compromised renderer; reject anything that is not a
/// plain identifier before it touches the vault.
fn validate_key(key: &str) -> Result<(), &'static str> {
    if key.is_empty() {
        return Err("secret key must not be empty");
    }
    if key.len() > MAX_KEY_LEN {
        return Err("secret key is too long");
    }
    if key.chars().any(|c| c.is_control()) {
        return Err("secret key contains control characters");
    }
    Ok(())
}

fn bad_request(error: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "success": false, "error": error })),
    )
        .into_response()
}

pub async fn list_secrets(State(state): State<BridgeState>) -> Json<serde_json::Value> {
    let mut keys = state.vault.list().await;
    keys.sort();
    Json(serde_json::json!({ "success": true, "keys": keys }))
}

pub async fn get_secret(Path(key): Path<String>, State(state): State<BridgeState>) -> Response {
    if let Err(e) = validate_key(&key) {
        return bad_request(e);
    }
    let value = state.vault.get(&key).await;
    Json(serde_json::json!({ "success": true, "value": value })).into_response()
}

#[derive(serde::Deserialize)]
pub struct SetSecretRequest {
    key: String,
    value: String,
}

pub async fn set_secret(
    State(state): State<BridgeState>,
    Json(payload): Json<SetSecretRequest>,
) -> Response {
    if let Err(e) = validate_key(&payload.key) {
        return bad_request(e);
    }
    if payload.value.len() > MAX_VALUE_LEN {
        return bad_request("secret value is too large");
    }
    match state.vault.set(&payload.key, &payload.value).await {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => {
            Json(serde_json::json!({ "success": false, "error": e.to_string() })).into_response()
        }
    }
}

pub async fn delete_secret(Path(key): Path<String>, State(state): State<BridgeState>) -> Response {
    if let Err(e) = validate_key(&key) {
        return bad_request(e);
    }
    match state.vault.delete(&key).await {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => {
            Json(serde_json::json!({ "success": false, "error": e.to_string() })).into_response()
        }
    }
}
