use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{app::AppState, config::Environment};

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    match Environment::deployed(&state.config.environment) {
        Some(environment) => Json(json!({
            "status": "healthy",
            "environment": environment.display_name(),
        })),
        None => Json(json!({
            "status": "error",
            "message": "Invalid environment",
        })),
    }
}
