use crate::config::AppState;

use axum::{extract::State, Json};
use serde_json::{json, Value};

pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status":    "ok",
        "version":   env!("CARGO_PKG_VERSION"),
        "transport": format!("{:?}", state.cfg.chain.transport).to_lowercase(),
    }))
}
