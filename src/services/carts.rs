use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{cart, cart_item, Cart, CartItem, CartItemModel, CartModel, Product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        pricing::{self, PricingBreakdown},
        promo_codes::PromoCodeService,
    },
};

/// Shopping cart service.
///
/// Carts hold items and an advisory promo snapshot; every pricing figure a
/// caller sees is recomputed from those on read. Applying a promo code here
/// never consumes a use - redemption happens inside checkout.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    promo_codes: Arc<PromoCodeService>,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        promo_codes: Arc<PromoCodeService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            promo_codes,
        }
    }

    /// Creates a new cart for a user or an anonymous session.
    #[instrument(skip(self))]
    pub async fn create_cart(&self, input: CreateCartInput) -> Result<CartModel, ServiceError> {
        let cart_id = Uuid::new_v4();
        let cart = cart::ActiveModel {
            id: Set(cart_id),
            user_id: Set(input.user_id),
            session_id: Set(input.session_id),
            promo_code_id: Set(None),
            promo_discount_percent: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };

        let cart = cart.insert(&*self.db).await?;
        self.event_sender
            .send_or_log(Event::CartCreated(cart_id))
            .await;

        info!("created cart {}", cart_id);
        Ok(cart)
    }

    /// Returns the cart with its items and freshly derived pricing.
    pub async fn get_cart(&self, cart_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.find_cart(&*self.db, cart_id).await?;
        let items = cart
            .find_related(CartItem)
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        CartView::build(cart, items)
    }

    /// Adds a product to the cart, or bumps the quantity if it is already
    /// there. The unit price is captured from the catalog on first add and
    /// kept on subsequent increments.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        cart_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartView, ServiceError> {
        if input.quantity <= 0 {
            return Err(ServiceError::InvalidInput(format!(
                "quantity must be positive, got {}",
                input.quantity
            )));
        }

        let txn = self.db.begin().await?;
        let cart = self.find_cart(&txn, cart_id).await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("product {} not found", input.product_id))
            })?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .one(&txn)
            .await?;

        if let Some(item) = existing {
            let quantity = item.quantity + input.quantity;
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        } else {
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart_id),
                product_id: Set(input.product_id),
                quantity: Set(input.quantity),
                unit_price: Set(product.price),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
            };
            item.insert(&txn).await?;
        }

        self.touch_cart(&txn, cart).await?;
        let view = self.load_view(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id,
                product_id: input.product_id,
            })
            .await;
        Ok(view)
    }

    /// Sets the quantity of a cart item; zero or less removes it.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.find_cart(&txn, cart_id).await?;

        let item = CartItem::find_by_id(item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("cart item {} not found", item_id)))?;
        if item.cart_id != cart_id {
            return Err(ServiceError::InvalidInput(
                "item does not belong to this cart".to_string(),
            ));
        }

        if quantity <= 0 {
            item.delete(&txn).await?;
        } else {
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        }

        self.touch_cart(&txn, cart).await?;
        let view = self.load_view(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated(cart_id))
            .await;
        Ok(view)
    }

    /// Removes an item from the cart.
    pub async fn remove_item(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        self.update_item_quantity(cart_id, item_id, 0).await
    }

    /// Deletes all items and clears any applied promo. The cart row stays.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, cart_id: Uuid) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.find_cart(&txn, cart_id).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&txn)
            .await?;

        let mut active: cart::ActiveModel = cart.into();
        active.promo_code_id = Set(None);
        active.promo_discount_percent = Set(None);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        let view = self.load_view(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated(cart_id))
            .await;
        info!("cleared cart {}", cart_id);
        Ok(view)
    }

    /// Applies a promo code to the cart: validates it (advisory) and
    /// snapshots its current percentage. No usage counter is touched and no
    /// usage row is written; checkout re-validates and redeems.
    #[instrument(skip(self))]
    pub async fn apply_promo_code(
        &self,
        cart_id: Uuid,
        code: &str,
    ) -> Result<CartView, ServiceError> {
        let promo = self.promo_codes.validate(code).await?.into_result()?;

        let txn = self.db.begin().await?;
        let cart = self.find_cart(&txn, cart_id).await?;

        let promo_id = promo.id;
        let mut active: cart::ActiveModel = cart.into();
        active.promo_code_id = Set(Some(promo.id));
        active.promo_discount_percent = Set(Some(promo.discount_percent));
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        let view = self.load_view(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PromoCodeApplied {
                cart_id,
                promo_code_id: promo_id,
            })
            .await;
        Ok(view)
    }

    /// Clears the promo snapshot from the cart. Never touches usage counts.
    #[instrument(skip(self))]
    pub async fn remove_promo_code(&self, cart_id: Uuid) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.find_cart(&txn, cart_id).await?;

        let mut active: cart::ActiveModel = cart.into();
        active.promo_code_id = Set(None);
        active.promo_discount_percent = Set(None);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        let view = self.load_view(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PromoCodeRemoved { cart_id })
            .await;
        Ok(view)
    }

    async fn find_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        Cart::find_by_id(cart_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("cart {} not found", cart_id)))
    }

    async fn touch_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart: CartModel,
    ) -> Result<(), ServiceError> {
        let mut active: cart::ActiveModel = cart.into();
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;
        Ok(())
    }

    async fn load_view<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let cart = self.find_cart(conn, cart_id).await?;
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(conn)
            .await?;
        CartView::build(cart, items)
    }
}

/// Input for creating a cart
#[derive(Debug, Default, Deserialize)]
pub struct CreateCartInput {
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
}

/// Input for adding an item to a cart
#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Cart with its items and the pricing derived from them.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub cart: CartModel,
    pub items: Vec<CartItemModel>,
    pub pricing: PricingBreakdown,
}

impl CartView {
    fn build(cart: CartModel, items: Vec<CartItemModel>) -> Result<Self, ServiceError> {
        let lines: Vec<(Decimal, i32)> =
            items.iter().map(|i| (i.unit_price, i.quantity)).collect();
        let pricing = pricing::price_lines(&lines, cart.promo_discount_percent)?;
        Ok(Self {
            cart,
            items,
            pricing,
        })
    }
}
