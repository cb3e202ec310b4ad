use axum::extract::State;
use axum::Json;

use crate::middleware::Actor;
use crate::models::RuntimeConfig;
use crate::AppState;

pub async fn runtime_config(_actor: Actor, State(state): State<AppState>) -> Json<RuntimeConfig> {
    Json(state.settings.runtime.clone())
}
