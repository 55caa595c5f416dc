pub mod addresses;
pub mod carts;
pub mod checkout;
pub mod orders;
pub mod webhooks;

use std::sync::Arc;

use axum::{
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde_json::json;
use utoipa::OpenApi;

use crate::{
    events::EventSender,
    services::{
        addresses::AddressService, carts::CartService, orders::OrderService,
        staged_orders::StagedOrderService,
    },
    AppState,
};

/// The wired service graph handed to every handler through `AppState`.
#[derive(Clone)]
pub struct AppServices {
    pub carts: Arc<CartService>,
    pub addresses: Arc<AddressService>,
    pub orders: Arc<OrderService>,
    pub staged_orders: Arc<StagedOrderService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        staged_order_ttl_secs: u64,
    ) -> Self {
        let carts = Arc::new(CartService::new(db.clone()));
        let addresses = Arc::new(AddressService::new(db.clone()));
        let staged_orders = Arc::new(StagedOrderService::new(db.clone(), staged_order_ttl_secs));
        let orders = Arc::new(OrderService::new(
            db,
            carts.clone(),
            addresses.clone(),
            event_sender,
        ));
        Self {
            carts,
            addresses,
            orders,
            staged_orders,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        carts::get_cart,
        carts::add_cart_item,
        carts::update_cart_item,
        carts::remove_cart_item,
        addresses::create_address,
        addresses::list_addresses,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::list_order_events,
        orders::update_order_status,
        checkout::start_checkout,
        webhooks::payment_webhook,
        webhooks::payment_success_webhook,
        webhooks::payment_failure_webhook,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::services::carts::AddItemInput,
        crate::services::carts::CartWithItems,
        crate::services::addresses::CreateAddressInput,
        crate::services::orders::CreateOrderFromCartInput,
        crate::services::orders::OrderWithItems,
        crate::services::staged_orders::ShippingInfo,
        crate::services::staged_orders::StagedItem,
        carts::UpdateQuantityRequest,
        orders::UpdateStatusRequest,
        checkout::CheckoutItem,
        checkout::CheckoutRequest,
        checkout::CheckoutResponse,
        webhooks::StatusPayload,
        webhooks::StagedPayload,
        webhooks::WebhookResponse,
    )),
    info(
        title = "orderflow-api",
        description = "Order lifecycle and payment reconciliation service"
    )
)]
pub struct ApiDoc;

pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn openapi_spec() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/openapi.json", get(openapi_spec))
        .route(
            "/customers/:customer_id/cart",
            get(carts::get_cart),
        )
        .route(
            "/customers/:customer_id/cart/items",
            post(carts::add_cart_item),
        )
        .route(
            "/customers/:customer_id/cart/items/:product_id",
            put(carts::update_cart_item).delete(carts::remove_cart_item),
        )
        .route(
            "/customers/:customer_id/addresses",
            post(addresses::create_address).get(addresses::list_addresses),
        )
        .route(
            "/orders",
            post(orders::create_order).get(orders::list_orders),
        )
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/events", get(orders::list_order_events))
        .route("/orders/:id/status", put(orders::update_order_status))
        .route("/checkout", post(checkout::start_checkout))
        .route("/webhooks/payment", post(webhooks::payment_webhook))
        .route(
            "/webhooks/payment/success",
            post(webhooks::payment_success_webhook),
        )
        .route(
            "/webhooks/payment/failure",
            post(webhooks::payment_failure_webhook),
        )
        .with_state(state)
}
