//! `GET /health`: reports far-tier reachability without ever failing the request, so the proxy
//! can report itself healthy even while degraded to direct forwarding.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::server::ProxyState;

pub async fn handle(State(state): State<Arc<ProxyState>>) -> Json<Value> {
    let far_tier = if state.store.far().health_check().await {
        "ok"
    } else {
        "down"
    };
    Json(json!({ "status": "ok", "far_tier": far_tier }))
}
