use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::instrument;

use crate::{
    state::AppState,
    storage::{rejection, Statistic},
};

pub fn statistics_routes() -> Router<AppState> {
    Router::new().route("/statistics", get(get_statistics))
}

/// Current snapshot, computed on first request if no signal write has produced one yet.
#[instrument(skip(state))]
pub async fn get_statistics(
    State(state): State<AppState>,
) -> Result<Json<Statistic>, (StatusCode, String)> {
    let stat = match state.storage.get_statistics().await.map_err(rejection)? {
        Some(s) => s,
        None => state.storage.update_statistics().await.map_err(rejection)?,
    };
    Ok(Json(stat))
}
