use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use lessonbook_infra::BookingError;

pub fn booking_error_to_response(err: BookingError) -> axum::response::Response {
    match err {
        BookingError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        BookingError::SlotNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "lesson_not_found", err.to_string())
        }
        BookingError::OrderNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "order_not_found", err.to_string())
        }
        BookingError::CapacityExhausted { .. } => {
            json_error(StatusCode::BAD_REQUEST, "capacity_exhausted", err.to_string())
        }
        BookingError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "internal error")
        }
    }
}

/// Malformed JSON is a validation problem, not a 422.
pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_json", rejection.body_text())
}

pub fn invalid_id(kind: &str, raw: &str) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {kind} id: {raw}"))
}

/// Empty search results: 404 with a `message` body.
pub fn no_orders_for(name: &str) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        axum::Json(json!({
            "message": format!("No orders found for name starting with \"{}\"", name.trim()),
        })),
    )
        .into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": message.into(),
            "code": code,
        })),
    )
        .into_response()
}
