use axum::{extract::State, response::IntoResponse, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    events::Event,
    payments::{encode_order_reference, OpenSessionRequest, SessionItem},
    services::staged_orders::{CreateStagedInput, ShippingInfo, StagedItem},
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub customer_id: Option<Uuid>,
    pub customer_email: String,
    pub items: Vec<CheckoutItem>,
    pub shipping_info: ShippingInfo,
    pub total_amount: Decimal,
    pub currency: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub payment_url: String,
    pub session_id: String,
    pub temp_order_id: String,
}

/// POST /checkout — staged (gateway-first) flow initiation.
///
/// Stages a self-contained snapshot, then opens the gateway session. A
/// gateway failure leaves the staged record in place for the reaper or a
/// retried checkout; rolling it back is deliberately not this handler's job.
#[utoipa::path(
    post,
    path = "/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Payment session opened", body = CheckoutResponse),
        (status = 400, description = "Validation failure", body = crate::errors::ErrorResponse),
        (status = 500, description = "Gateway or persistence failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn start_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let items: Vec<StagedItem> = request
        .items
        .into_iter()
        .map(|item| StagedItem {
            product_id: item.product_id,
            name: item.name,
            image_url: item.image_url,
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: item.unit_price * Decimal::from(item.quantity.max(0)),
        })
        .collect();

    let staged = state
        .services
        .staged_orders
        .create_staged(CreateStagedInput {
            customer_id: request.customer_id,
            customer_email: request.customer_email.clone(),
            items: items.clone(),
            shipping_info: request.shipping_info,
            total_amount: request.total_amount,
            currency: request.currency.unwrap_or_else(|| "USD".to_string()),
        })
        .await?;

    if let Err(e) = state
        .event_sender
        .send(Event::CheckoutStaged {
            reference: staged.reference.clone(),
        })
        .await
    {
        warn!(error = %e, "failed to send checkout staged event");
    }

    let session = state
        .gateway
        .open_session(OpenSessionRequest {
            reference: encode_order_reference(&staged.reference),
            customer_email: request.customer_email,
            amount: staged.total_amount,
            currency: staged.currency.clone(),
            items: items
                .into_iter()
                .map(|item| SessionItem {
                    product_id: item.product_id,
                    name: item.name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
        })
        .await?;

    info!(reference = %staged.reference, session_id = %session.session_id, "checkout staged");
    Ok(Json(CheckoutResponse {
        payment_url: session.redirect_url,
        session_id: session.session_id,
        temp_order_id: staged.reference,
    }))
}
