use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        user_wallet, wallet_transaction, TransactionKind, UserWallet, UserWalletModel,
        WalletTransaction, WalletTransactionModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Retries for the standalone credit/debit paths when an append loses the
/// optimistic race on the wallet balance.
const APPEND_RETRIES: u32 = 5;

/// Append-only wallet ledger.
///
/// Every balance change is an appended `wallet_transaction` row plus a
/// conditional update of the wallet's cached balance, guarded on the balance
/// the append was computed from. Two concurrent appends against one wallet
/// can therefore never both start from the same balance: the loser's guard
/// matches zero rows and the append is retried (standalone paths) or aborts
/// the enclosing transaction (checkout, order lifecycle).
#[derive(Clone)]
pub struct WalletService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl WalletService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Fetches the user's wallet, creating an empty one on first use.
    pub async fn get_or_create_wallet(
        &self,
        user_id: Uuid,
    ) -> Result<UserWalletModel, ServiceError> {
        get_or_create_wallet(&*self.db, user_id).await
    }

    /// Current balance for a user, zero if no wallet exists yet.
    pub async fn balance(&self, user_id: Uuid) -> Result<Decimal, ServiceError> {
        let wallet = UserWallet::find()
            .filter(user_wallet::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?;
        Ok(wallet.map(|w| w.balance).unwrap_or(Decimal::ZERO))
    }

    /// Ledger rows for a user, newest first, paginated.
    pub async fn transaction_history(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<WalletTransactionModel>, u64), ServiceError> {
        let wallet = UserWallet::find()
            .filter(user_wallet::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("wallet for user {}", user_id)))?;

        let paginator = WalletTransaction::find()
            .filter(wallet_transaction::Column::WalletId.eq(wallet.id))
            .order_by_desc(wallet_transaction::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }

    /// Credits a user's wallet, creating it if necessary.
    #[instrument(skip(self))]
    pub async fn credit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        description: String,
        order_id: Option<Uuid>,
    ) -> Result<WalletTransactionModel, ServiceError> {
        let tx = self
            .append_with_retry(user_id, TransactionKind::Credit, amount, description, order_id)
            .await?;
        self.event_sender
            .send_or_log(Event::WalletCredited {
                wallet_id: tx.wallet_id,
                amount,
            })
            .await;
        Ok(tx)
    }

    /// Debits a user's wallet; fails with `InsufficientWalletBalance` when
    /// the balance does not cover the amount.
    #[instrument(skip(self))]
    pub async fn debit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        description: String,
        order_id: Option<Uuid>,
    ) -> Result<WalletTransactionModel, ServiceError> {
        let tx = self
            .append_with_retry(user_id, TransactionKind::Debit, amount, description, order_id)
            .await?;
        self.event_sender
            .send_or_log(Event::WalletDebited {
                wallet_id: tx.wallet_id,
                amount,
            })
            .await;
        Ok(tx)
    }

    async fn append_with_retry(
        &self,
        user_id: Uuid,
        kind: TransactionKind,
        amount: Decimal,
        description: String,
        order_id: Option<Uuid>,
    ) -> Result<WalletTransactionModel, ServiceError> {
        for attempt in 0..APPEND_RETRIES {
            let txn = self.db.begin().await?;
            let wallet = get_or_create_wallet(&txn, user_id).await?;
            match append_transaction(&txn, &wallet, kind, amount, description.clone(), order_id)
                .await
            {
                Ok(tx) => {
                    txn.commit().await?;
                    return Ok(tx);
                }
                Err(ServiceError::Conflict(_)) => {
                    // Lost the balance race to a concurrent append; re-read
                    // the wallet and try again.
                    txn.rollback().await?;
                    warn!(
                        "wallet {} append conflict, attempt {}",
                        wallet.id,
                        attempt + 1
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(ServiceError::Conflict(format!(
            "wallet for user {} is under contention",
            user_id
        )))
    }
}

/// Fetches or lazily creates the wallet row for a user.
pub(crate) async fn get_or_create_wallet<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<UserWalletModel, ServiceError> {
    if let Some(wallet) = UserWallet::find()
        .filter(user_wallet::Column::UserId.eq(user_id))
        .one(conn)
        .await?
    {
        return Ok(wallet);
    }

    let wallet = user_wallet::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        balance: Set(Decimal::ZERO),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    };
    let wallet = wallet.insert(conn).await?;
    info!("created wallet {} for user {}", wallet.id, user_id);
    Ok(wallet)
}

/// Appends one ledger row and moves the cached balance, in the caller's
/// transaction.
///
/// The balance update is guarded on the exact balance the row was computed
/// from; zero affected rows means a concurrent append won and the caller
/// must either retry from a fresh read or abort.
pub(crate) async fn append_transaction<C: ConnectionTrait>(
    conn: &C,
    wallet: &UserWalletModel,
    kind: TransactionKind,
    amount: Decimal,
    description: String,
    order_id: Option<Uuid>,
) -> Result<WalletTransactionModel, ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::InvalidInput(format!(
            "ledger amount must be positive, got {}",
            amount
        )));
    }

    let balance_before = wallet.balance;
    let balance_after = match kind {
        TransactionKind::Credit => balance_before + amount,
        TransactionKind::Debit => {
            if balance_before < amount {
                return Err(ServiceError::InsufficientWalletBalance);
            }
            balance_before - amount
        }
    };

    let result = UserWallet::update_many()
        .col_expr(user_wallet::Column::Balance, Expr::value(balance_after))
        .col_expr(user_wallet::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(user_wallet::Column::Id.eq(wallet.id))
        .filter(user_wallet::Column::Balance.eq(balance_before))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(format!(
            "wallet {} balance changed concurrently",
            wallet.id
        )));
    }

    let tx = wallet_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        wallet_id: Set(wallet.id),
        kind: Set(kind),
        amount: Set(amount),
        balance_before: Set(balance_before),
        balance_after: Set(balance_after),
        description: Set(description),
        order_id: Set(order_id),
        created_at: Set(Utc::now()),
    };
    Ok(tx.insert(conn).await?)
}
