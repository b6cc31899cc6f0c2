use crate::domain::context::build_context;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;

/// Raw bytes, not `Json`: signatures cover the exact body as delivered.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let ctx = build_context(&headers);
    match state
        .webhook_pipeline
        .process_webhook(&provider, &body, &headers, &ctx.correlation_id)
        .await
    {
        Ok(result) => (axum::http::StatusCode::OK, Json(result)).into_response(),
        Err(err) => err.into_response(),
    }
}
