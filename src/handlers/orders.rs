use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::orders::CreateOrderFromCartInput,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub note: Option<String>,
}

/// POST /orders — direct flow: the customer's cart becomes an order.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderFromCartInput,
    responses(
        (status = 201, description = "Order created from cart"),
        (status = 400, description = "Empty cart or invalid address", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(input): Json<CreateOrderFromCartInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.create_order_from_cart(input).await?;
    Ok((axum::http::StatusCode::CREATED, Json(order)))
}

/// GET /orders — most recent first, optionally scoped to one customer.
#[utoipa::path(
    get,
    path = "/orders",
    params(("customer_id" = Option<Uuid>, Query, description = "Filter by customer")),
    responses((status = 200, description = "Orders, newest first")),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.services.orders.list_orders(query.customer_id).await?;
    Ok(Json(orders))
}

/// GET /orders/{id} — header plus item lines.
#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .get_order_with_items(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(order))
}

/// GET /orders/{id}/events — the audit trail, oldest first.
#[utoipa::path(
    get,
    path = "/orders/{id}/events",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Audit trail"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn list_order_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .orders
        .get_order(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;
    let events = state.services.orders.list_events(id).await?;
    Ok(Json(events))
}

/// PUT /orders/{id}/status — admin status write.
#[utoipa::path(
    put,
    path = "/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated"),
        (status = 400, description = "Unknown status or terminal order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .update_status(id, &request.status, request.note)
        .await?;
    Ok(Json(order))
}
