use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, put},
    Json, Router,
};

use lessonbook_catalog::{SlotQuery, SortDirection, SortKey};
use lessonbook_core::SlotId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_lessons))
        .route("/:id", put(update_lesson))
        .route("/:id/spaces", patch(adjust_spaces))
}

pub async fn list_lessons(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::LessonListParams>,
) -> axum::response::Response {
    let sort = match params.sort.as_deref().map(SortKey::parse).transpose() {
        Ok(sort) => sort.unwrap_or_default(),
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.message()),
    };
    let direction = params.dir.as_deref().map(SortDirection::parse).unwrap_or_default();
    let query = SlotQuery::new(params.q, sort, direction);

    match services.catalog.list(&query).await {
        Ok(slots) => Json(slots.iter().map(dto::LessonResponse::from).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn update_lesson(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateLessonBody>, JsonRejection>,
) -> axum::response::Response {
    let id: SlotId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("lesson", &id),
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let patch = match body.into_patch() {
        Ok(p) => p,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    match services.catalog.update_details(id, &patch).await {
        Ok(slot) => Json(dto::LessonResponse::from(&slot)).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn adjust_spaces(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::AdjustSpacesBody>, JsonRejection>,
) -> axum::response::Response {
    let id: SlotId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("lesson", &id),
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let delta = match body.delta() {
        Ok(d) => d,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };

    match services.catalog.adjust_space(id, delta).await {
        Ok(slot) => Json(dto::LessonResponse::from(&slot)).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}
