use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    Set, SqlErr, Unchanged,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        order, order_event, order_item, Order, OrderEvent, OrderEventModel, OrderItem,
        OrderItemModel, OrderModel, StagedOrderModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        addresses::AddressService,
        carts::CartService,
        order_status::{
            map_gateway_status, GatewayStatusMapping, OrderStatus, PaymentStatus,
        },
        staged_orders::StagedOrderService,
    },
};

/// How many fresh order numbers to try when the unique column reports a
/// collision. The generator makes collisions vanishingly rare; the column
/// constraint makes them harmless.
const ORDER_NUMBER_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderFromCartInput {
    pub customer_id: Uuid,
    pub shipping_address_id: Uuid,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    #[schema(value_type = Object)]
    pub order: OrderModel,
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<OrderItemModel>,
}

/// Order factory and status writer. Materializes orders from carts (direct
/// flow) or staged snapshots (gateway-first flow) with the same
/// header-then-items discipline and compensating rollback.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    carts: Arc<CartService>,
    addresses: Arc<AddressService>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        carts: Arc<CartService>,
        addresses: Arc<AddressService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            carts,
            addresses,
            event_sender,
        }
    }

    /// Direct flow: converts the customer's cart straight into an order.
    ///
    /// Fails fast with a validation error (and performs no writes) when the
    /// cart is empty or the address is not the customer's. After the order is
    /// durable the cart is drained; a failure to drain is logged and
    /// swallowed, the order is already authoritative.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id))]
    pub async fn create_order_from_cart(
        &self,
        input: CreateOrderFromCartInput,
    ) -> Result<OrderModel, ServiceError> {
        let cart_view = self
            .carts
            .get_cart_with_items(input.customer_id)
            .await?
            .filter(|view| !view.items.is_empty())
            .ok_or_else(|| ServiceError::ValidationError("Cart is empty".to_string()))?;

        let address = self
            .addresses
            .resolve_owned(input.shipping_address_id, input.customer_id)
            .await?;

        let subtotal = cart_view.subtotal;
        let shipping_total = Decimal::ZERO;
        let tax_total = Decimal::ZERO;
        let total_amount = subtotal + shipping_total + tax_total;

        let items: Vec<NewOrderItem> = cart_view
            .items
            .iter()
            .map(|item| NewOrderItem {
                product_id: item.product_id,
                name: item.name.clone(),
                image_url: item.image_url.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total,
            })
            .collect();

        let header = NewOrderHeader {
            customer_id: Some(input.customer_id),
            customer_email: None,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: input.payment_method,
            notes: input.notes,
            subtotal,
            shipping_total,
            tax_total,
            total_amount,
            currency: cart_view.cart.currency.clone(),
            shipping_address: serde_json::to_value(&address)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?,
        };

        let order = self.insert_order_with_items(header, &items).await?;
        self.record_event(
            order.id,
            None,
            Some(order.status.clone()),
            Some(order.payment_status.clone()),
            None,
            Some("order created from cart".to_string()),
        )
        .await?;

        // The order is durable from here on; a stale cart is a UI nuisance
        // corrected by the next read, not a reason to fail the checkout.
        if let Err(e) = self.carts.clear_cart(cart_view.cart.id).await {
            warn!(order_id = %order.id, error = %e, "cart clear failed after order creation");
        }

        if let Err(e) = self.event_sender.send(Event::OrderCreated(order.id)).await {
            warn!(order_id = %order.id, error = %e, "failed to send order created event");
        }

        info!(order_id = %order.id, order_number = %order.order_number, total = %order.total_amount, "order created");
        Ok(order)
    }

    /// Gateway-first flow: promotes a staged snapshot into a real order.
    /// Reads nothing but the snapshot itself; the live cart may have changed
    /// or belong to a guest who is long gone.
    #[instrument(skip(self, staged), fields(reference = %staged.reference))]
    pub async fn create_order_from_staged(
        &self,
        staged: &StagedOrderModel,
    ) -> Result<OrderModel, ServiceError> {
        let snapshot_items = StagedOrderService::snapshot_items(staged)?;
        let items: Vec<NewOrderItem> = snapshot_items
            .into_iter()
            .map(|item| NewOrderItem {
                product_id: item.product_id,
                name: item.name,
                image_url: item.image_url,
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total,
            })
            .collect();

        let header = NewOrderHeader {
            customer_id: staged.customer_id,
            customer_email: Some(staged.customer_email.clone()),
            status: OrderStatus::Confirmed,
            payment_status: PaymentStatus::Completed,
            payment_method: None,
            notes: None,
            subtotal: staged.subtotal,
            shipping_total: staged.shipping_total,
            tax_total: staged.tax_total,
            total_amount: staged.total_amount,
            currency: staged.currency.clone(),
            shipping_address: staged.shipping_address.clone(),
        };

        let order = self.insert_order_with_items(header, &items).await?;
        self.record_event(
            order.id,
            None,
            Some(order.status.clone()),
            Some(order.payment_status.clone()),
            None,
            Some(format!("promoted from staged checkout {}", staged.reference)),
        )
        .await?;

        info!(order_id = %order.id, reference = %staged.reference, "staged order promoted");
        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        Ok(Order::find_by_id(order_id).one(&*self.db).await?)
    }

    pub async fn get_order_with_items(
        &self,
        order_id: Uuid,
    ) -> Result<Option<OrderWithItems>, ServiceError> {
        let Some(order) = self.get_order(order_id).await? else {
            return Ok(None);
        };
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok(Some(OrderWithItems { order, items }))
    }

    pub async fn list_orders(
        &self,
        customer_id: Option<Uuid>,
    ) -> Result<Vec<OrderModel>, ServiceError> {
        let mut query = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(customer_id) = customer_id {
            query = query.filter(order::Column::CustomerId.eq(customer_id));
        }
        Ok(query.all(&*self.db).await?)
    }

    /// The order's append-only audit trail, oldest first.
    pub async fn list_events(&self, order_id: Uuid) -> Result<Vec<OrderEventModel>, ServiceError> {
        Ok(OrderEvent::find()
            .filter(order_event::Column::OrderId.eq(order_id))
            .order_by_asc(order_event::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Admin status writer. Validates the value against the enumerated set,
    /// refuses to leave terminal states, and touches only the status fields
    /// so concurrent webhook-driven edits are not clobbered.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: &str,
        note: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let target = OrderStatus::parse(new_status)?;

        let current = self
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;
        let from = OrderStatus::parse(&current.status)?;

        if !from.can_transition_to(target) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot change status of a {from} order to {target}"
            )));
        }

        let updated = self
            .apply_field_update(&current, Some(target), None)
            .await?;
        self.record_event(
            order_id,
            Some(from.to_string()),
            Some(target.to_string()),
            None,
            None,
            note,
        )
        .await?;

        if let Err(e) = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status: from.to_string(),
                new_status: target.to_string(),
            })
            .await
        {
            warn!(order_id = %order_id, error = %e, "failed to send status changed event");
        }

        info!(order_id = %order_id, from = %from, to = %target, "order status updated");
        Ok(updated)
    }

    /// Applies a raw gateway status to an already-materialized order. A
    /// recognized status updates payment_status (and status, when the
    /// mapping says so); an unrecognized one changes nothing but is kept in
    /// the audit trail for later inspection.
    #[instrument(skip(self), fields(order_id = %order_id, raw_status = %raw_status))]
    pub async fn apply_gateway_status(
        &self,
        order_id: Uuid,
        raw_status: &str,
        payment_ref: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let current = self
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        // Gateway callbacks can arrive late and out of order; a terminal
        // order is never moved by one, only annotated.
        let from_status = OrderStatus::parse(&current.status)?;
        if from_status.is_terminal() {
            warn!(order_id = %order_id, raw_status = %raw_status, current = %from_status, "gateway status for terminal order, audit only");
            self.record_event(
                order_id,
                None,
                None,
                None,
                Some(raw_status.to_string()),
                payment_ref.map(|r| format!("gateway payment {r}")),
            )
            .await?;
            return Ok(current);
        }

        match map_gateway_status(raw_status) {
            GatewayStatusMapping::Apply {
                payment_status,
                order_status,
            } => {
                let from = current.status.clone();
                let updated = self
                    .apply_field_update(&current, order_status, Some(payment_status))
                    .await?;
                self.record_event(
                    order_id,
                    Some(from),
                    order_status.map(|s| s.to_string()),
                    Some(payment_status.to_string()),
                    Some(raw_status.to_string()),
                    payment_ref.map(|r| format!("gateway payment {r}")),
                )
                .await?;

                if let Err(e) = self
                    .event_sender
                    .send(Event::PaymentStatusChanged {
                        order_id,
                        payment_status: payment_status.to_string(),
                    })
                    .await
                {
                    warn!(order_id = %order_id, error = %e, "failed to send payment status event");
                }
                Ok(updated)
            }
            GatewayStatusMapping::AuditOnly => {
                warn!(order_id = %order_id, raw_status = %raw_status, "unrecognized gateway status, audit only");
                self.record_event(
                    order_id,
                    None,
                    None,
                    None,
                    Some(raw_status.to_string()),
                    payment_ref.map(|r| format!("gateway payment {r}")),
                )
                .await?;
                Ok(current)
            }
        }
    }

    /// Inserts the header, then the items, compensating with a header delete
    /// if the items cannot be written: an order with zero items must never
    /// survive. Order numbers are regenerated and retried when the unique
    /// column reports a collision.
    async fn insert_order_with_items(
        &self,
        header: NewOrderHeader,
        items: &[NewOrderItem],
    ) -> Result<OrderModel, ServiceError> {
        let order = self.insert_header(&header).await?;

        let now = Utc::now();
        let item_models: Vec<order_item::ActiveModel> = items
            .iter()
            .map(|item| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(item.product_id),
                name: Set(item.name.clone()),
                image_url: Set(item.image_url.clone()),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                line_total: Set(item.line_total),
                created_at: Set(now),
            })
            .collect();

        if let Err(item_err) = OrderItem::insert_many(item_models).exec(&*self.db).await {
            error!(order_id = %order.id, error = %item_err, "order item insert failed, rolling back header");
            if let Err(rollback_err) = Order::delete_by_id(order.id).exec(&*self.db).await {
                // Both writes failed; surface the original cause, the
                // orphaned header is picked up by ops tooling.
                error!(order_id = %order.id, error = %rollback_err, "compensating header delete failed");
            }
            return Err(ServiceError::DatabaseError(item_err));
        }

        Ok(order)
    }

    async fn insert_header(&self, header: &NewOrderHeader) -> Result<OrderModel, ServiceError> {
        let mut last_err: Option<sea_orm::DbErr> = None;

        for attempt in 0..ORDER_NUMBER_ATTEMPTS {
            let now = Utc::now();
            let active = order::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_number: Set(generate_order_number()),
                customer_id: Set(header.customer_id),
                status: Set(header.status.to_string()),
                payment_status: Set(header.payment_status.to_string()),
                payment_method: Set(header.payment_method.clone()),
                customer_email: Set(header.customer_email.clone()),
                notes: Set(header.notes.clone()),
                subtotal: Set(header.subtotal),
                shipping_total: Set(header.shipping_total),
                tax_total: Set(header.tax_total),
                total_amount: Set(header.total_amount),
                currency: Set(header.currency.clone()),
                shipping_address: Set(Some(header.shipping_address.clone())),
                created_at: Set(now),
                updated_at: Set(Some(now)),
                version: Set(1),
            };

            match active.insert(&*self.db).await {
                Ok(order) => return Ok(order),
                Err(e) => match e.sql_err() {
                    Some(SqlErr::UniqueConstraintViolation(_)) => {
                        warn!(attempt, "order number collision, regenerating");
                        last_err = Some(e);
                    }
                    _ => return Err(ServiceError::DatabaseError(e)),
                },
            }
        }

        Err(ServiceError::DatabaseError(last_err.unwrap_or_else(|| {
            sea_orm::DbErr::Custom("order number generation exhausted".to_string())
        })))
    }

    /// Field-level update: only status columns, updated_at and version are
    /// touched, never the whole record.
    async fn apply_field_update(
        &self,
        current: &OrderModel,
        status: Option<OrderStatus>,
        payment_status: Option<PaymentStatus>,
    ) -> Result<OrderModel, ServiceError> {
        let mut active = order::ActiveModel {
            id: Unchanged(current.id),
            ..Default::default()
        };
        if let Some(status) = status {
            active.status = Set(status.to_string());
        }
        if let Some(payment_status) = payment_status {
            active.payment_status = Set(payment_status.to_string());
        }
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(current.version + 1);
        Ok(active.update(&*self.db).await?)
    }

    async fn record_event(
        &self,
        order_id: Uuid,
        from_status: Option<String>,
        to_status: Option<String>,
        payment_status: Option<String>,
        raw_gateway_status: Option<String>,
        note: Option<String>,
    ) -> Result<(), ServiceError> {
        let active = order_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            from_status: Set(from_status),
            to_status: Set(to_status),
            payment_status: Set(payment_status),
            raw_gateway_status: Set(raw_gateway_status),
            note: Set(note),
            created_at: Set(Utc::now()),
        };
        active.insert(&*self.db).await?;
        Ok(())
    }
}

struct NewOrderHeader {
    customer_id: Option<Uuid>,
    customer_email: Option<String>,
    status: OrderStatus,
    payment_status: PaymentStatus,
    payment_method: Option<String>,
    notes: Option<String>,
    subtotal: Decimal,
    shipping_total: Decimal,
    tax_total: Decimal,
    total_amount: Decimal,
    currency: String,
    shipping_address: serde_json::Value,
}

struct NewOrderItem {
    product_id: Uuid,
    name: String,
    image_url: Option<String>,
    quantity: i32,
    unit_price: Decimal,
    line_total: Decimal,
}

/// `"ORD-{YYYYMMDD}-{6 upper hex}"`. Unique with overwhelming probability;
/// the unique column plus retry in `insert_header` covers the rest.
fn generate_order_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix: u32 = rand::thread_rng().gen_range(0..0xFF_FFFF);
    format!("ORD-{}-{:06X}", date, suffix)
}
