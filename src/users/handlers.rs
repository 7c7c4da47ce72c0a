use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use super::dto::{LoginRequest, RegisterRequest};
use super::services::{hash_credential, validate_registration, verify_credential};
use crate::{
    pagination::Limit,
    state::AppState,
    storage::{rejection, Signal, User},
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/users/login", post(login))
        .route("/users/:id", get(get_user))
        .route("/users/:id/signals", get(user_signals))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), (StatusCode, String)> {
    let mut new_user = validate_registration(payload).map_err(|msg| {
        warn!(%msg, "invalid registration");
        (StatusCode::BAD_REQUEST, msg)
    })?;

    new_user.password = hash_credential(&new_user.password).map_err(|e| {
        error!(error = %e, "hash_credential failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let user = state.storage.create_user(new_user).await.map_err(|e| {
        warn!(error = %e, "create user failed");
        rejection(e)
    })?;

    info!(user_id = user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<User>, (StatusCode, String)> {
    let username = payload.username.trim();
    let user = match state.storage.get_user_by_username(username).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(%username, "login unknown username");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => return Err(rejection(e)),
    };

    let ok = verify_credential(&payload.password, &user.password).map_err(|e| {
        error!(error = %e, user_id = user.id, "verify_credential failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    if !ok || !user.is_active {
        warn!(user_id = user.id, active = user.is_active, "login rejected");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    state
        .storage
        .update_user_last_login(user.id)
        .await
        .map_err(rejection)?;
    let user = state
        .storage
        .get_user(user.id)
        .await
        .map_err(rejection)?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    info!(user_id = user.id, "user logged in");
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<User>, (StatusCode, String)> {
    state
        .storage
        .get_user(id)
        .await
        .map_err(rejection)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "User not found".into()))
}

#[instrument(skip(state))]
pub async fn user_signals(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(q): Query<Limit>,
) -> Result<Json<Vec<Signal>>, (StatusCode, String)> {
    let signals = state
        .storage
        .get_user_signals(id, q.or(50))
        .await
        .map_err(rejection)?;
    Ok(Json(signals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Direction, NewSignal};
    use time::{Duration, OffsetDateTime};

    fn registration(username: &str) -> Json<RegisterRequest> {
        Json(RegisterRequest {
            username: username.into(),
            password: "correct-horse".into(),
            email: Some("ana@example.com".into()),
            full_name: None,
        })
    }

    fn credentials(username: &str, password: &str) -> Json<LoginRequest> {
        Json(LoginRequest {
            username: username.into(),
            password: password.into(),
        })
    }

    #[tokio::test]
    async fn register_then_login_stamps_last_login() {
        let state = AppState::fake();
        let (status, Json(user)) = register(State(state.clone()), registration("ana"))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(user.last_login.is_none());

        let stored = state.storage.get_user(user.id).await.unwrap().unwrap();
        assert_ne!(stored.password, "correct-horse");

        let Json(logged_in) = login(State(state.clone()), credentials("ana", "correct-horse"))
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);
        assert!(logged_in.last_login.is_some());

        let json = serde_json::to_string(&logged_in).unwrap();
        assert!(!json.contains("argon2"));
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let state = AppState::fake();
        register(State(state.clone()), registration("ana"))
            .await
            .unwrap();
        let (status, _) = register(State(state), registration("ana"))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn bad_credentials_are_unauthorized() {
        let state = AppState::fake();
        register(State(state.clone()), registration("ana"))
            .await
            .unwrap();

        let (status, _) = login(State(state.clone()), credentials("ana", "wrong-password"))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = login(State(state), credentials("bob", "correct-horse"))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn lookup_and_owned_signals() {
        let state = AppState::fake();
        let (_, Json(user)) = register(State(state.clone()), registration("ana"))
            .await
            .unwrap();

        for owner in [Some(user.id), None, Some(user.id)] {
            state
                .storage
                .create_signal(NewSignal {
                    user_id: owner,
                    currency_pair: "EUR/USD".into(),
                    direction: Direction::Down,
                    entry_time: OffsetDateTime::now_utc() + Duration::minutes(2),
                    expiration_minutes: 1,
                })
                .await
                .unwrap();
        }

        let Json(found) = get_user(State(state.clone()), Path(user.id)).await.unwrap();
        assert_eq!(found.username, "ana");
        let (status, _) = get_user(State(state.clone()), Path(999)).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let Json(owned) = user_signals(State(state), Path(user.id), Query(Limit::default()))
            .await
            .unwrap();
        assert_eq!(owned.len(), 2);
        assert!(owned.iter().all(|s| s.user_id == Some(user.id)));
    }
}
