use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::dto::{GenerateSignalRequest, UpdateResultRequest};
use super::services::{build_signal, validate_generate, validate_result};
use crate::{
    pagination::Limit,
    state::AppState,
    storage::{rejection, Signal},
};

pub fn signal_routes() -> Router<AppState> {
    Router::new()
        .route("/signals/generate", post(generate_signal))
        .route("/signals/recent", get(recent_signals))
        .route("/signals/:id", get(get_signal))
        .route("/signals/:id/result", patch(update_result))
}

#[instrument(skip(state, payload))]
pub async fn generate_signal(
    State(state): State<AppState>,
    Json(payload): Json<GenerateSignalRequest>,
) -> Result<(StatusCode, Json<Signal>), (StatusCode, String)> {
    let (currency_pair, expiration_minutes) = validate_generate(&payload).map_err(|msg| {
        warn!(%msg, "invalid signal request");
        (StatusCode::BAD_REQUEST, msg)
    })?;

    let new_signal = {
        let mut rng = rand::thread_rng();
        build_signal(
            currency_pair,
            expiration_minutes,
            state.config.default_signal_user_id,
            OffsetDateTime::now_utc(),
            &mut rng,
        )
    };

    let signal = state
        .storage
        .create_signal(new_signal)
        .await
        .map_err(rejection)?;

    info!(
        signal_id = signal.id,
        pair = %signal.currency_pair,
        direction = %signal.direction,
        "signal generated"
    );
    Ok((StatusCode::CREATED, Json(signal)))
}

#[instrument(skip(state))]
pub async fn recent_signals(
    State(state): State<AppState>,
    Query(q): Query<Limit>,
) -> Result<Json<Vec<Signal>>, (StatusCode, String)> {
    let signals = state
        .storage
        .get_recent_signals(q.or(10))
        .await
        .map_err(rejection)?;
    Ok(Json(signals))
}

#[instrument(skip(state))]
pub async fn get_signal(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Signal>, (StatusCode, String)> {
    state
        .storage
        .get_signal_by_id(id)
        .await
        .map_err(rejection)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Signal not found".into()))
}

#[instrument(skip(state, payload))]
pub async fn update_result(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateResultRequest>,
) -> Result<Json<Signal>, (StatusCode, String)> {
    let result = validate_result(&payload).map_err(|msg| {
        warn!(signal_id = id, %msg, "invalid result update");
        (StatusCode::BAD_REQUEST, msg)
    })?;

    match state
        .storage
        .update_signal_result(id, result, payload.win_amount)
        .await
    {
        Ok(Some(signal)) => {
            info!(signal_id = id, %result, "signal resolved");
            Ok(Json(signal))
        }
        Ok(None) => {
            warn!(signal_id = id, "result update for unknown signal");
            Err((StatusCode::NOT_FOUND, "Signal not found".into()))
        }
        Err(e) => {
            warn!(signal_id = id, error = %e, "result update rejected");
            Err(rejection(e))
        }
    }
}
