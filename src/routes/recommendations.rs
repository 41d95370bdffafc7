use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{RecommendRequest, RecommendResponse},
    routes::AppState,
};

/// Handler for the recommendations endpoint
///
/// The request is validated before the model is consulted.
pub async fn recommend(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> AppResult<Json<RecommendResponse>> {
    let Json(request) = payload.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let query = request.validate(state.max_recommendations)?;

    let snapshot = state.store.require_current().await?;
    let recommendations = snapshot.recommend(query.user_id, query.max);

    tracing::info!(
        request_id = %request_id,
        user_id = query.user_id,
        requested = query.max,
        returned = recommendations.len(),
        model_version = snapshot.version,
        "Served recommendations"
    );

    Ok(Json(RecommendResponse {
        user_id: query.user_id,
        model_version: snapshot.version,
        recommendations,
    }))
}
