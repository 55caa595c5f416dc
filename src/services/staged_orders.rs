use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{staged_order, StagedOrder, StagedOrderModel},
    errors::ServiceError,
};

/// One resolved line in a staged snapshot. Carries everything the eventual
/// order item needs so promotion never re-reads the live cart or catalog.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StagedItem {
    pub product_id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Shipping details, normalized into the same shape the order snapshot uses.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ShippingInfo {
    #[validate(length(min = 1, message = "Recipient is required"))]
    pub recipient: String,
    #[validate(length(min = 1, message = "Address line is required"))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    pub province: String,
    pub country_code: String,
    pub postal_code: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Validate)]
pub struct CreateStagedInput {
    pub customer_id: Option<Uuid>,
    #[validate(email(message = "A valid customer email is required"))]
    pub customer_email: String,
    pub items: Vec<StagedItem>,
    #[validate]
    pub shipping_info: ShippingInfo,
    pub total_amount: Decimal,
    pub currency: String,
}

#[derive(Clone)]
pub struct StagedOrderService {
    db: Arc<DatabaseConnection>,
    ttl: Duration,
}

impl StagedOrderService {
    pub fn new(db: Arc<DatabaseConnection>, ttl_secs: u64) -> Self {
        Self {
            db,
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Persists a provisional checkout under a fresh opaque reference and
    /// returns the stored snapshot.
    #[instrument(skip(self, input), fields(customer_email = %input.customer_email))]
    pub async fn create_staged(
        &self,
        input: CreateStagedInput,
    ) -> Result<StagedOrderModel, ServiceError> {
        input.validate()?;
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Checkout requires at least one item".to_string(),
            ));
        }
        if input.total_amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Total amount must not be negative".to_string(),
            ));
        }
        for item in &input.items {
            if item.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for product {} must be at least 1",
                    item.product_id
                )));
            }
        }

        let now = Utc::now();
        let reference = generate_reference(now);
        let subtotal: Decimal = input.items.iter().map(|i| i.line_total).sum();

        let active = staged_order::ActiveModel {
            reference: Set(reference.clone()),
            customer_id: Set(input.customer_id),
            customer_email: Set(input.customer_email),
            items: Set(serde_json::to_value(&input.items)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?),
            shipping_address: Set(serde_json::to_value(&input.shipping_info)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?),
            subtotal: Set(subtotal),
            shipping_total: Set(Decimal::ZERO),
            tax_total: Set(Decimal::ZERO),
            total_amount: Set(input.total_amount),
            currency: Set(input.currency),
            expires_at: Set(now + self.ttl),
            created_at: Set(now),
        };

        let staged = active.insert(&*self.db).await?;
        info!(reference = %staged.reference, total = %staged.total_amount, "staged order created");
        Ok(staged)
    }

    /// Looks up a staged order. A missing reference is a normal outcome:
    /// the record may already have been consumed or reaped.
    pub async fn get_staged(
        &self,
        reference: &str,
    ) -> Result<Option<StagedOrderModel>, ServiceError> {
        Ok(StagedOrder::find_by_id(reference.to_string())
            .one(&*self.db)
            .await?)
    }

    /// Deletes a staged order, reporting whether a record was actually
    /// removed. Deleting an absent reference succeeds quietly so retried
    /// webhooks never crash the caller.
    #[instrument(skip(self), fields(reference = %reference))]
    pub async fn delete_staged(&self, reference: &str) -> Result<bool, ServiceError> {
        let result = StagedOrder::delete_by_id(reference.to_string())
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// The reaper's sweep: removes staged orders whose expiry passed without
    /// a terminal webhook. Returns the number reaped.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = StagedOrder::delete_many()
            .filter(staged_order::Column::ExpiresAt.lt(now))
            .exec(&*self.db)
            .await?;
        if result.rows_affected > 0 {
            warn!(reaped = result.rows_affected, "expired staged orders purged");
        }
        Ok(result.rows_affected)
    }

    /// Decodes the items snapshot back into typed lines.
    pub fn snapshot_items(staged: &StagedOrderModel) -> Result<Vec<StagedItem>, ServiceError> {
        serde_json::from_value(staged.items.clone())
            .map_err(|e| ServiceError::InternalError(format!("corrupt staged snapshot: {e}")))
    }
}

/// Builds a reference unique per call: nanosecond timestamp plus a random
/// token. Unrelated to order numbers by design.
fn generate_reference(now: DateTime<Utc>) -> String {
    let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp());
    let token: u32 = rand::thread_rng().gen();
    format!("TMP-{}-{:08x}", nanos, token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_are_unique_and_prefixed() {
        let now = Utc::now();
        let a = generate_reference(now);
        let b = generate_reference(now);
        assert!(a.starts_with("TMP-"));
        assert_ne!(a, b);
    }
}
