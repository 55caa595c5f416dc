use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{errors::ServiceError, services::addresses::CreateAddressInput, AppState};

/// POST /customers/{customer_id}/addresses
#[utoipa::path(
    post,
    path = "/customers/{customer_id}/addresses",
    params(("customer_id" = Uuid, Path, description = "Customer id")),
    request_body = CreateAddressInput,
    responses(
        (status = 201, description = "Address created"),
        (status = 400, description = "Validation failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Addresses"
)]
pub async fn create_address(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(input): Json<CreateAddressInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let address = state
        .services
        .addresses
        .create_address(customer_id, input)
        .await?;
    Ok((axum::http::StatusCode::CREATED, Json(address)))
}

/// GET /customers/{customer_id}/addresses — default first, then newest.
#[utoipa::path(
    get,
    path = "/customers/{customer_id}/addresses",
    params(("customer_id" = Uuid, Path, description = "Customer id")),
    responses((status = 200, description = "Customer addresses")),
    tag = "Addresses"
)]
pub async fn list_addresses(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let addresses = state.services.addresses.list_addresses(customer_id).await?;
    Ok(Json(addresses))
}
