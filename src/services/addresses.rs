use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{customer_address, CustomerAddress, CustomerAddressModel},
    errors::ServiceError,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateAddressInput {
    #[validate(length(min = 1, message = "Recipient is required"))]
    pub recipient: String,
    #[validate(length(min = 1, message = "Address line is required"))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "Province is required"))]
    pub province: String,
    #[validate(length(equal = 2, message = "Country code must be ISO 3166-1 alpha-2"))]
    pub country_code: String,
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates an address. Making it the default unsets every other default
    /// the customer has, inside one transaction, so at most one default
    /// exists at any time.
    #[instrument(skip(self, input), fields(customer_id = %customer_id))]
    pub async fn create_address(
        &self,
        customer_id: Uuid,
        input: CreateAddressInput,
    ) -> Result<CustomerAddressModel, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;

        if input.is_default {
            CustomerAddress::update_many()
                .col_expr(customer_address::Column::IsDefault, Expr::value(false))
                .filter(customer_address::Column::CustomerId.eq(customer_id))
                .filter(customer_address::Column::IsDefault.eq(true))
                .exec(&txn)
                .await?;
        }

        let now = Utc::now();
        let active = customer_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            recipient: Set(input.recipient),
            line1: Set(input.line1),
            line2: Set(input.line2),
            city: Set(input.city),
            province: Set(input.province),
            country_code: Set(input.country_code.to_ascii_uppercase()),
            postal_code: Set(input.postal_code),
            phone: Set(input.phone),
            is_default: Set(input.is_default),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let address = active.insert(&txn).await?;
        txn.commit().await?;

        info!(address_id = %address.id, is_default = address.is_default, "address created");
        Ok(address)
    }

    /// Resolves an address for order creation, enforcing ownership. A missing
    /// or foreign address is a precondition failure, not a plain 404.
    #[instrument(skip(self), fields(address_id = %address_id, customer_id = %customer_id))]
    pub async fn resolve_owned(
        &self,
        address_id: Uuid,
        customer_id: Uuid,
    ) -> Result<CustomerAddressModel, ServiceError> {
        CustomerAddress::find_by_id(address_id)
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "Shipping address not found for this customer".to_string(),
                )
            })
    }

    pub async fn list_addresses(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<CustomerAddressModel>, ServiceError> {
        Ok(CustomerAddress::find()
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .order_by_desc(customer_address::Column::IsDefault)
            .order_by_desc(customer_address::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }
}
