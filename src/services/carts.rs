use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{cart, cart_item, Cart, CartItem, CartItemModel, CartModel},
    errors::ServiceError,
};

/// Input for adding an item to a customer's cart. The price is captured here,
/// at add-time, and travels with the line from then on.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddItemInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, message = "Product name is required"))]
    pub name: String,
    pub image_url: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Cart plus its items and the derived subtotal.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartWithItems {
    #[schema(value_type = Object)]
    pub cart: CartModel,
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<CartItemModel>,
    pub subtotal: Decimal,
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Loads the customer's cart with its items in one logical read.
    /// A customer who never added anything has no cart and gets an empty view.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn get_cart_with_items(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<CartWithItems>, ServiceError> {
        let Some(cart) = self.find_cart(customer_id).await? else {
            return Ok(None);
        };

        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&*self.db)
            .await?;

        let subtotal = items.iter().map(|i| i.line_total).sum();
        Ok(Some(CartWithItems {
            cart,
            items,
            subtotal,
        }))
    }

    /// Adds an item, creating the cart lazily on first use. Adding a product
    /// already in the cart bumps its quantity and refreshes the captured
    /// price.
    #[instrument(skip(self, input), fields(customer_id = %customer_id, product_id = %input.product_id))]
    pub async fn add_item(
        &self,
        customer_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartItemModel, ServiceError> {
        input.validate()?;
        if input.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Unit price must not be negative".to_string(),
            ));
        }

        let cart = match self.find_cart(customer_id).await? {
            Some(cart) => cart,
            None => self.create_cart(customer_id).await?,
        };
        let now = Utc::now();

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .one(&*self.db)
            .await?;

        let item = match existing {
            Some(existing) => {
                let quantity = existing.quantity + input.quantity;
                let mut active: cart_item::ActiveModel = existing.into();
                active.quantity = Set(quantity);
                active.unit_price = Set(input.unit_price);
                active.line_total = Set(input.unit_price * Decimal::from(quantity));
                active.updated_at = Set(now);
                active.update(&*self.db).await?
            }
            None => {
                let active = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(input.product_id),
                    name: Set(input.name),
                    image_url: Set(input.image_url),
                    quantity: Set(input.quantity),
                    unit_price: Set(input.unit_price),
                    line_total: Set(input.unit_price * Decimal::from(input.quantity)),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                active.insert(&*self.db).await?
            }
        };

        self.touch_cart(&cart).await?;
        info!(cart_id = %cart.id, quantity = item.quantity, "cart item added");
        Ok(item)
    }

    /// Sets an item's quantity. Zero or less removes the line entirely; a
    /// cart never keeps an item at quantity zero.
    #[instrument(skip(self), fields(customer_id = %customer_id, product_id = %product_id))]
    pub async fn update_item_quantity(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Option<CartItemModel>, ServiceError> {
        let cart = self
            .find_cart(customer_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

        let item = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))?;

        if quantity <= 0 {
            CartItem::delete_by_id(item.id).exec(&*self.db).await?;
            self.touch_cart(&cart).await?;
            return Ok(None);
        }

        let unit_price = item.unit_price;
        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        active.line_total = Set(unit_price * Decimal::from(quantity));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        self.touch_cart(&cart).await?;
        Ok(Some(updated))
    }

    /// Removes an item from the cart.
    #[instrument(skip(self), fields(customer_id = %customer_id, product_id = %product_id))]
    pub async fn remove_item(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
    ) -> Result<(), ServiceError> {
        let cart = self
            .find_cart(customer_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

        let deleted = CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;

        if deleted.rows_affected == 0 {
            return Err(ServiceError::NotFound("Cart item not found".to_string()));
        }
        self.touch_cart(&cart).await?;
        Ok(())
    }

    /// Deletes every item in the cart, returning the number removed. Called
    /// once a direct-flow order has been made durable.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn clear_cart(&self, cart_id: Uuid) -> Result<u64, ServiceError> {
        let deleted = CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&*self.db)
            .await?;
        info!(rows = deleted.rows_affected, "cart cleared");
        Ok(deleted.rows_affected)
    }

    async fn find_cart(&self, customer_id: Uuid) -> Result<Option<CartModel>, ServiceError> {
        Ok(Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?)
    }

    async fn create_cart(&self, customer_id: Uuid) -> Result<CartModel, ServiceError> {
        let now = Utc::now();
        let active = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            currency: Set("USD".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let cart = active.insert(&*self.db).await?;
        info!(cart_id = %cart.id, "cart created");
        Ok(cart)
    }

    async fn touch_cart(&self, cart: &CartModel) -> Result<(), ServiceError> {
        let mut active: cart::ActiveModel = cart.clone().into();
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        Ok(())
    }
}
