use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{errors::ServiceError, services::carts::AddItemInput, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

/// GET /customers/{customer_id}/cart
#[utoipa::path(
    get,
    path = "/customers/{customer_id}/cart",
    params(("customer_id" = Uuid, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Cart with items and subtotal"),
        (status = 404, description = "Customer has no cart", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .carts
        .get_cart_with_items(customer_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;
    Ok(Json(cart))
}

/// POST /customers/{customer_id}/cart/items
#[utoipa::path(
    post,
    path = "/customers/{customer_id}/cart/items",
    params(("customer_id" = Uuid, Path, description = "Customer id")),
    request_body = AddItemInput,
    responses(
        (status = 201, description = "Item added"),
        (status = 400, description = "Validation failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn add_cart_item(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(input): Json<AddItemInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state.services.carts.add_item(customer_id, input).await?;
    Ok((axum::http::StatusCode::CREATED, Json(item)))
}

/// PUT /customers/{customer_id}/cart/items/{product_id}
///
/// A quantity of zero or less removes the line; the response body is the
/// updated item, or null when the line was removed.
#[utoipa::path(
    put,
    path = "/customers/{customer_id}/cart/items/{product_id}",
    params(
        ("customer_id" = Uuid, Path, description = "Customer id"),
        ("product_id" = Uuid, Path, description = "Product id")
    ),
    request_body = UpdateQuantityRequest,
    responses(
        (status = 200, description = "Quantity updated or line removed"),
        (status = 404, description = "Cart or item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    Path((customer_id, product_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state
        .services
        .carts
        .update_item_quantity(customer_id, product_id, request.quantity)
        .await?;
    Ok(Json(item))
}

/// DELETE /customers/{customer_id}/cart/items/{product_id}
#[utoipa::path(
    delete,
    path = "/customers/{customer_id}/cart/items/{product_id}",
    params(
        ("customer_id" = Uuid, Path, description = "Customer id"),
        ("product_id" = Uuid, Path, description = "Product id")
    ),
    responses(
        (status = 204, description = "Item removed"),
        (status = 404, description = "Cart or item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    Path((customer_id, product_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .carts
        .remove_item(customer_id, product_id)
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
