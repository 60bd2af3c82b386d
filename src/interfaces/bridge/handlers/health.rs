use axum::{Json, extract::State};

use super::super::BridgeState;
use crate::core::health::HealthReport;

pub async fn check_health(State(state): State<BridgeState>) -> Json<HealthReport> {
    Json(state.health.check().await)
}
