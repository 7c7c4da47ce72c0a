use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::dto::{ApproveResponse, CreateTestimonialRequest};
use crate::{
    pagination::Limit,
    state::AppState,
    storage::{rejection, Testimonial},
};

pub fn testimonial_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/testimonials",
            get(approved_testimonials).post(create_testimonial),
        )
        .route("/testimonials/:id/approve", patch(approve_testimonial))
}

#[instrument(skip(state))]
pub async fn approved_testimonials(
    State(state): State<AppState>,
    Query(q): Query<Limit>,
) -> Result<Json<Vec<Testimonial>>, (StatusCode, String)> {
    let items = state
        .storage
        .get_approved_testimonials(q.or(10))
        .await
        .map_err(rejection)?;
    Ok(Json(items))
}

#[instrument(skip(state, payload))]
pub async fn create_testimonial(
    State(state): State<AppState>,
    Json(payload): Json<CreateTestimonialRequest>,
) -> Result<(StatusCode, Json<Testimonial>), (StatusCode, String)> {
    let new = payload.validate().map_err(|msg| {
        warn!(%msg, "invalid testimonial");
        (StatusCode::BAD_REQUEST, msg)
    })?;

    let created = state
        .storage
        .create_testimonial(new)
        .await
        .map_err(rejection)?;
    info!(testimonial_id = created.id, rating = created.rating, "testimonial submitted");
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(state))]
pub async fn approve_testimonial(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ApproveResponse>, (StatusCode, String)> {
    let found = state
        .storage
        .approve_testimonial(id)
        .await
        .map_err(rejection)?;
    if !found {
        warn!(testimonial_id = id, "approve unknown testimonial");
        return Err((StatusCode::NOT_FOUND, "Testimonial not found".into()));
    }
    info!(testimonial_id = id, "testimonial approved");
    Ok(Json(ApproveResponse { success: true }))
}
