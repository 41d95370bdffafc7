use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    Extension, Json,
};

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    routes::AppState,
    services::snapshot::SnapshotSummary,
};

/// Retrains on demand and returns the published snapshot
///
/// Each call reloads every table and retrains, so callers must present the
/// configured bearer token.
pub async fn refresh(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
) -> AppResult<Json<SnapshotSummary>> {
    authorize(state.refresh_token.as_deref(), &headers)?;

    tracing::info!(request_id = %request_id, "Refresh requested");
    let snapshot = state.store.refresh(state.source.as_ref()).await?;
    Ok(Json(snapshot.summary()))
}

fn authorize(expected: Option<&str>, headers: &HeaderMap) -> AppResult<()> {
    let Some(expected) = expected else {
        return Err(AppError::Forbidden(
            "on-demand refresh is disabled; set REFRESH_TOKEN to enable it".to_string(),
        ));
    };

    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if token == expected => Ok(()),
        Some(_) => {
            tracing::warn!("Refresh rejected: wrong bearer token");
            Err(AppError::Unauthorized("invalid bearer token".to_string()))
        }
        None => Err(AppError::Unauthorized("missing bearer token".to_string())),
    }
}
