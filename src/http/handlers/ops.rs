use crate::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let (store, db_ok) = match &state.pool {
        Some(pool) => ("postgres", sqlx::query("SELECT 1").execute(pool).await.is_ok()),
        None => ("memory", true),
    };

    let ok = db_ok;
    let status = if ok {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "ready": ok,
            "store": store,
            "db": db_ok,
            "payments_enabled": state.config.payments_enabled,
            "default_provider": state.config.default_provider,
        })),
    )
        .into_response()
}

pub async fn liveness() -> impl IntoResponse {
    (axum::http::StatusCode::OK, Json(serde_json::json!({"alive": true}))).into_response()
}
