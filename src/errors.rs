use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use uuid::Uuid;

use crate::entities::OrderStatus;

/// Error type for every fallible operation in the engine.
///
/// Business-rule rejections are distinct variants so callers can map them to
/// structured responses; storage failures surface as `Unavailable` and are
/// never conflated with a rule rejection. Every failing checkout path leaves
/// promo counters, stock and wallet balances untouched because the whole
/// call runs in one transaction that rolls back on error.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] DbErr),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cart is empty")]
    CartEmpty,

    #[error("order total {total} is below the minimum order amount {minimum}")]
    MinimumOrderNotMet { total: Decimal, minimum: Decimal },

    #[error("promo code not found")]
    PromoNotFound,

    #[error("promo code is not active")]
    PromoInactive,

    #[error("promo code has expired")]
    PromoExpired,

    #[error("promo code usage limit reached")]
    PromoLimitReached,

    #[error("applied promo code is no longer valid: {0}")]
    PromoNoLongerValid(String),

    #[error("insufficient stock for product {0}")]
    InsufficientStock(Uuid),

    #[error("insufficient wallet balance")]
    InsufficientWalletBalance,

    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ServiceError {
    /// True for errors caused by the request rather than the system.
    /// `Unavailable`, `Conflict` and `Other` are the system-side kinds.
    pub fn is_business_rejection(&self) -> bool {
        !matches!(
            self,
            ServiceError::Unavailable(_) | ServiceError::Conflict(_) | ServiceError::Other(_)
        )
    }
}
