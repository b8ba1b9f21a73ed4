use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, ModelTrait, QueryFilter, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        cart, cart_item, order, order_item, product, user_wallet, Cart, CartItem, CartItemModel,
        OrderModel, OrderStatus, PromoCode, PromoCodeModel, ProductModel, TransactionKind,
        UserWallet,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        pricing,
        promo_codes::{PromoCodeService, PromoRedemption, PromoValidation},
        settings, wallet,
    },
};

/// Converts a cart into an order as one all-or-nothing transaction.
///
/// Every mutation - promo usage increment, stock decrements, wallet debit,
/// order insert, cart clearing - happens inside a single storage
/// transaction. Any rejection returns before commit, so a failed checkout
/// leaves promo counters, stock and wallet balances exactly as found. The
/// two shared-counter steps (promo usage, stock) are guarded conditional
/// updates, never read-check-write.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    promo_codes: Arc<PromoCodeService>,
}

impl CheckoutService {
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

    #[instrument(skip(self, input), fields(cart_id = %input.cart_id, user_id = %input.user_id))]
    pub async fn checkout(&self, input: CheckoutInput) -> Result<OrderModel, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;

        let cart_model = Cart::find_by_id(input.cart_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("cart {} not found", input.cart_id)))?;

        let items = cart_model.find_related(CartItem).all(&txn).await?;
        if items.is_empty() {
            return Err(ServiceError::CartEmpty);
        }

        // Recompute pricing from live items and the snapshotted percentage.
        let lines: Vec<(Decimal, i32)> =
            items.iter().map(|i| (i.unit_price, i.quantity)).collect();
        let pricing = pricing::price_lines(&lines, cart_model.promo_discount_percent)?;

        let store = settings::load(&txn).await?;
        if store.enforce_minimum_order && pricing.total < store.minimum_order_amount {
            return Err(ServiceError::MinimumOrderNotMet {
                total: pricing.total,
                minimum: store.minimum_order_amount,
            });
        }

        // Authoritative promo re-check at this instant. The earlier apply
        // step guaranteed nothing; the shopper must re-decide if the code
        // went bad in the meantime.
        let promo = match cart_model.promo_code_id {
            Some(promo_id) => Some(self.revalidate_promo(&txn, promo_id).await?),
            None => None,
        };

        let wallet_amount = input.wallet_amount.unwrap_or(Decimal::ZERO);
        if wallet_amount > pricing.total {
            return Err(ServiceError::InvalidInput(format!(
                "wallet amount {} exceeds order total {}",
                wallet_amount, pricing.total
            )));
        }
        let total_amount = pricing.total - wallet_amount;

        // Snapshot product data before mutating stock; missing products mean
        // the catalog changed under the cart.
        let products = self.load_products(&txn, &items).await?;

        let order_id = Uuid::new_v4();

        if let Some(promo) = &promo {
            self.promo_codes
                .redeem_within(
                    &txn,
                    promo,
                    PromoRedemption {
                        order_id,
                        user_id: Some(input.user_id),
                        cart_id: Some(cart_model.id),
                        discount_amount: pricing.discount,
                        order_total: pricing.total,
                    },
                )
                .await?;
        }

        for item in &items {
            self.decrement_stock(&txn, item).await?;
        }

        if wallet_amount > Decimal::ZERO {
            let user_wallet = UserWallet::find()
                .filter(user_wallet::Column::UserId.eq(input.user_id))
                .one(&txn)
                .await?
                .ok_or(ServiceError::InsufficientWalletBalance)?;
            wallet::append_transaction(
                &txn,
                &user_wallet,
                TransactionKind::Debit,
                wallet_amount,
                format!("Payment towards order ORD-{}", short_id(order_id)),
                Some(order_id),
            )
            .await?;
        }

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!("ORD-{}", short_id(order_id))),
            user_id: Set(input.user_id),
            status: Set(OrderStatus::Pending),
            subtotal: Set(pricing.subtotal),
            promo_discount: Set(pricing.discount),
            wallet_discount: Set(wallet_amount),
            total_amount: Set(total_amount),
            promo_code_id: Set(promo.as_ref().map(|p| p.id)),
            delivery_name: Set(input.delivery_name),
            delivery_phone: Set(input.delivery_phone),
            delivery_address: Set(input.delivery_address),
            bonus_awarded: Set(false),
            bonus_amount: Set(Decimal::ZERO),
            cancellation_settled: Set(false),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let created = order_model.insert(&txn).await?;

        for item in &items {
            let snapshot = &products[&item.product_id];
            let order_item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                product_name: Set(snapshot.name.clone()),
                sku: Set(snapshot.sku.clone()),
                unit_price: Set(item.unit_price),
                quantity: Set(item.quantity),
                total_price: Set(item.unit_price * Decimal::from(item.quantity)),
                created_at: Set(Utc::now()),
            };
            order_item.insert(&txn).await?;
        }

        // The cart survives for reuse; its items and promo snapshot do not.
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_model.id))
            .exec(&txn)
            .await?;
        let mut cart_update: cart::ActiveModel = cart_model.into();
        cart_update.promo_code_id = Set(None);
        cart_update.promo_discount_percent = Set(None);
        cart_update.updated_at = Set(Utc::now());
        cart_update.update(&txn).await?;

        txn.commit().await?;

        if let Some(promo) = &promo {
            self.event_sender
                .send_or_log(Event::PromoCodeRedeemed {
                    promo_code_id: promo.id,
                    order_id,
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;

        info!(
            "checkout completed: order {} ({}) total {}",
            created.order_number, order_id, created.total_amount
        );
        Ok(created)
    }

    /// Re-validates the applied promo inside the checkout transaction.
    ///
    /// A code that was fine at apply time but is now inactive, expired or
    /// missing aborts with `PromoNoLongerValid` instead of silently dropping
    /// the discount. An exhausted limit keeps its own kind since the same
    /// race surfaces again at the redemption step.
    async fn revalidate_promo<C: ConnectionTrait>(
        &self,
        conn: &C,
        promo_id: Uuid,
    ) -> Result<PromoCodeModel, ServiceError> {
        let promo = PromoCode::find_by_id(promo_id).one(conn).await?;
        match PromoValidation::evaluate(promo, Utc::now()) {
            PromoValidation::Valid(promo) => Ok(promo),
            PromoValidation::LimitReached => Err(ServiceError::PromoLimitReached),
            PromoValidation::NotFound => {
                Err(ServiceError::PromoNoLongerValid("code was removed".to_string()))
            }
            PromoValidation::Inactive => {
                Err(ServiceError::PromoNoLongerValid("code was deactivated".to_string()))
            }
            PromoValidation::Expired => {
                Err(ServiceError::PromoNoLongerValid("code has expired".to_string()))
            }
        }
    }

    async fn load_products<C: ConnectionTrait>(
        &self,
        conn: &C,
        items: &[CartItemModel],
    ) -> Result<HashMap<Uuid, ProductModel>, ServiceError> {
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products = crate::entities::Product::find()
            .filter(product::Column::Id.is_in(ids))
            .all(conn)
            .await?;
        let map: HashMap<Uuid, ProductModel> =
            products.into_iter().map(|p| (p.id, p)).collect();

        for item in items {
            if !map.contains_key(&item.product_id) {
                return Err(ServiceError::NotFound(format!(
                    "product {} no longer exists",
                    item.product_id
                )));
            }
        }
        Ok(map)
    }

    /// Guarded stock decrement: a single conditional update that only
    /// matches while enough stock remains, so concurrent checkouts cannot
    /// oversell a product.
    async fn decrement_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        item: &CartItemModel,
    ) -> Result<(), ServiceError> {
        let result = crate::entities::Product::update_many()
            .col_expr(
                product::Column::StockQuantity,
                Expr::col(product::Column::StockQuantity).sub(item.quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(item.product_id))
            .filter(product::Column::StockQuantity.gte(item.quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(item.product_id));
        }
        Ok(())
    }
}

fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_uppercase()
}

/// Input for checkout. `wallet_amount` is caller-supplied and validated; the
/// engine infers no policy about how much of a balance may be applied.
#[derive(Debug, Deserialize)]
pub struct CheckoutInput {
    pub user_id: Uuid,
    pub cart_id: Uuid,
    pub delivery_name: String,
    pub delivery_phone: String,
    pub delivery_address: String,
    pub wallet_amount: Option<Decimal>,
}

impl CheckoutInput {
    fn validate(&self) -> Result<(), ServiceError> {
        if self.delivery_name.trim().is_empty() || self.delivery_address.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "delivery name and address are required".to_string(),
            ));
        }
        if let Some(amount) = self.wallet_amount {
            if amount.is_sign_negative() {
                return Err(ServiceError::InvalidInput(format!(
                    "wallet amount must not be negative, got {}",
                    amount
                )));
            }
        }
        Ok(())
    }
}
