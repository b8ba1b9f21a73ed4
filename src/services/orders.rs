use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait, UpdateMany,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        order, product, Order, OrderItem, OrderItemModel, OrderModel, OrderStatus, Product,
        TransactionKind,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{pricing, settings, wallet},
};

/// Order lifecycle: the status state machine and its financial side
/// effects.
///
/// Side effects (delivery bonus, cancellation compensations) run inside the
/// same transaction as the status change, each behind a persisted
/// idempotency flag claimed by a conditional update. A repeated trigger can
/// therefore never produce a second ledger row for the same order.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;
        let items = order.find_related(OrderItem).all(&*self.db).await?;
        Ok(OrderView { order, items })
    }

    pub async fn list_orders_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }

    /// Moves an order to a new status, running the transition's side
    /// effects in the same transaction.
    ///
    /// The status write is a conditional update filtered on the status the
    /// transition was decided from, so two racing transitions from the same
    /// state cannot both commit: the loser's update matches zero rows and
    /// the call fails with `Conflict` before any side effect runs. An order
    /// can therefore never leave a terminal state, and at most one
    /// transition's side effects are ever paid.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;

        let old_status = order.status;
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatusTransition {
                from: old_status,
                to: new_status,
            });
        }

        let claimed = status_transition(order_id, old_status, new_status)
            .exec(&txn)
            .await?;
        if claimed.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "order {} status changed concurrently",
                order_id
            )));
        }

        match new_status {
            OrderStatus::Delivered => self.award_delivery_bonus(&txn, &order).await?,
            OrderStatus::Cancelled => self.settle_cancellation(&txn, &order).await?,
            _ => {}
        }

        // Re-read so the returned model reflects side-effect columns too.
        let updated = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;

        info!(
            "order {} moved from {} to {}",
            order_id, old_status, new_status
        );
        Ok(updated)
    }

    /// Credits the delivery bonus, at most once per order.
    ///
    /// The `bonus_awarded` flag is claimed with a conditional update in the
    /// same transaction as the ledger write; whoever fails to claim it does
    /// nothing. Ineligible orders claim the flag too, with a zero amount, so
    /// eligibility is not re-evaluated under later settings.
    async fn award_delivery_bonus<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: &OrderModel,
    ) -> Result<(), ServiceError> {
        let store = settings::load(conn).await?;
        let eligible = store.bonus_percent > Decimal::ZERO
            && order.total_amount >= store.minimum_order_for_bonus;
        let bonus = if eligible {
            pricing::round_money(order.total_amount * store.bonus_percent / Decimal::from(100))
        } else {
            Decimal::ZERO
        };

        let claimed = Order::update_many()
            .col_expr(order::Column::BonusAwarded, Expr::value(true))
            .col_expr(order::Column::BonusAmount, Expr::value(bonus))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::BonusAwarded.eq(false))
            .exec(conn)
            .await?;
        if claimed.rows_affected == 0 {
            // Bonus already settled by an earlier delivery of this order.
            return Ok(());
        }

        if bonus > Decimal::ZERO {
            let user_wallet = wallet::get_or_create_wallet(conn, order.user_id).await?;
            wallet::append_transaction(
                conn,
                &user_wallet,
                TransactionKind::Credit,
                bonus,
                format!("Delivery bonus for order {}", order.order_number),
                Some(order.id),
            )
            .await?;
            info!("credited {} delivery bonus for order {}", bonus, order.id);
        }
        Ok(())
    }

    /// Runs cancellation compensations, at most once per order: a
    /// compensating wallet credit for any wallet amount the order consumed,
    /// and a stock restore when policy asks for it. The original debit row
    /// is never edited.
    async fn settle_cancellation<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: &OrderModel,
    ) -> Result<(), ServiceError> {
        let claimed = Order::update_many()
            .col_expr(order::Column::CancellationSettled, Expr::value(true))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::CancellationSettled.eq(false))
            .exec(conn)
            .await?;
        if claimed.rows_affected == 0 {
            return Ok(());
        }

        if order.wallet_discount > Decimal::ZERO {
            let user_wallet = wallet::get_or_create_wallet(conn, order.user_id).await?;
            wallet::append_transaction(
                conn,
                &user_wallet,
                TransactionKind::Credit,
                order.wallet_discount,
                format!("Refund for cancelled order {}", order.order_number),
                Some(order.id),
            )
            .await?;
        }

        let store = settings::load(conn).await?;
        if store.restore_stock_on_cancel {
            let items = order.find_related(OrderItem).all(conn).await?;
            for item in &items {
                let restored = Product::update_many()
                    .col_expr(
                        product::Column::StockQuantity,
                        Expr::col(product::Column::StockQuantity).add(item.quantity),
                    )
                    .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(product::Column::Id.eq(item.product_id))
                    .exec(conn)
                    .await?;
                if restored.rows_affected == 0 {
                    // Product gone from the catalog; nothing to restore to.
                    warn!(
                        "could not restore stock for product {} on order {}",
                        item.product_id, order.id
                    );
                }
            }
        }
        Ok(())
    }
}

/// Guarded status write: matches only while the order still holds the
/// status the transition was decided from.
fn status_transition(
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
) -> UpdateMany<order::Entity> {
    Order::update_many()
        .col_expr(order::Column::Status, Expr::value(to))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::Status.eq(from))
}

/// Order with its snapshotted line items.
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}
