use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};

use lessonbook_core::OrderId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/search", get(search_orders))
        .route("/summary", get(order_summary))
        .route("/:id", delete(cancel_order))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateOrderBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.lifecycle.create_order(&body.into_request()).await {
        Ok(created) => (StatusCode::CREATED, Json(dto::CreateOrderResponse::from(created))).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("order", &id),
    };

    match services.lifecycle.cancel_order(order_id).await {
        Ok(report) => Json(dto::CancelOrderResponse::from(report)).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn list_orders(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.queries.list().await {
        Ok(orders) => Json(orders.iter().map(dto::OrderResponse::from).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn search_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::NameQuery>,
) -> axum::response::Response {
    match services.queries.search(&params.name).await {
        Ok(orders) if orders.is_empty() => errors::no_orders_for(&params.name),
        Ok(orders) => Json(orders.iter().map(dto::OrderResponse::from).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn order_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::NameQuery>,
) -> axum::response::Response {
    match services.queries.summary(&params.name).await {
        Ok(rows) if rows.is_empty() => errors::no_orders_for(&params.name),
        Ok(rows) => Json(rows).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}
