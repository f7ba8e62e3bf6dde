use axum::{response::IntoResponse, Json};
use chrono::Utc;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": true,
        "ts": Utc::now().timestamp_millis(),
    }))
}
