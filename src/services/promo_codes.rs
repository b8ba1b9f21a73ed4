use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{promo_code, promo_code_usage, PromoCode, PromoCodeModel},
    errors::ServiceError,
};

/// Outcome of the advisory promo code check.
///
/// Used both by the non-binding "apply to cart" step and, authoritatively,
/// inside the checkout transaction. The checks never mutate anything; only
/// [`PromoCodeService::redeem_within`] consumes a use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PromoValidation {
    Valid(PromoCodeModel),
    NotFound,
    Inactive,
    Expired,
    LimitReached,
}

impl PromoValidation {
    /// Evaluates the validity rules in their fixed order: existence,
    /// active flag, expiration, usage limit. First failure wins.
    pub fn evaluate(promo: Option<PromoCodeModel>, now: DateTime<Utc>) -> Self {
        let Some(promo) = promo else {
            return PromoValidation::NotFound;
        };
        if !promo.is_active {
            return PromoValidation::Inactive;
        }
        if let Some(expires_at) = promo.expires_at {
            if expires_at < now {
                return PromoValidation::Expired;
            }
        }
        if let Some(limit) = promo.usage_limit {
            if promo.usage_count >= limit {
                return PromoValidation::LimitReached;
            }
        }
        PromoValidation::Valid(promo)
    }

    /// Maps a failed validation to its error kind, as reported by the
    /// non-binding probe and the apply-to-cart step.
    pub fn into_result(self) -> Result<PromoCodeModel, ServiceError> {
        match self {
            PromoValidation::Valid(promo) => Ok(promo),
            PromoValidation::NotFound => Err(ServiceError::PromoNotFound),
            PromoValidation::Inactive => Err(ServiceError::PromoInactive),
            PromoValidation::Expired => Err(ServiceError::PromoExpired),
            PromoValidation::LimitReached => Err(ServiceError::PromoLimitReached),
        }
    }
}

/// Promo code management: admin CRUD, the read-only validation probe, and
/// the transactional redemption step used by checkout.
#[derive(Clone)]
pub struct PromoCodeService {
    db: Arc<DatabaseConnection>,
}

impl PromoCodeService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_promo_code(
        &self,
        input: CreatePromoCodeInput,
    ) -> Result<PromoCodeModel, ServiceError> {
        validate_percent(input.discount_percent)?;
        if input.code.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "promo code must not be empty".to_string(),
            ));
        }
        if let Some(limit) = input.usage_limit {
            if limit < 0 {
                return Err(ServiceError::InvalidInput(
                    "usage limit must not be negative".to_string(),
                ));
            }
        }

        let existing = PromoCode::find()
            .filter(promo_code::Column::Code.eq(input.code.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "promo code {} already exists",
                input.code
            )));
        }

        let promo = promo_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(input.code),
            discount_percent: Set(input.discount_percent),
            expires_at: Set(input.expires_at),
            is_active: Set(input.is_active.unwrap_or(true)),
            usage_limit: Set(input.usage_limit),
            usage_count: Set(0),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };

        let promo = promo.insert(&*self.db).await?;
        info!("created promo code {} ({})", promo.code, promo.id);
        Ok(promo)
    }

    #[instrument(skip(self))]
    pub async fn update_promo_code(
        &self,
        id: Uuid,
        input: UpdatePromoCodeInput,
    ) -> Result<PromoCodeModel, ServiceError> {
        let promo = PromoCode::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::PromoNotFound)?;

        let mut active: promo_code::ActiveModel = promo.into();
        if let Some(percent) = input.discount_percent {
            validate_percent(percent)?;
            active.discount_percent = Set(percent);
        }
        if let Some(expires_at) = input.expires_at {
            active.expires_at = Set(expires_at);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(usage_limit) = input.usage_limit {
            if let Some(limit) = usage_limit {
                if limit < 0 {
                    return Err(ServiceError::InvalidInput(
                        "usage limit must not be negative".to_string(),
                    ));
                }
            }
            active.usage_limit = Set(usage_limit);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    /// Deactivates a code without deleting it; existing usage history stays.
    #[instrument(skip(self))]
    pub async fn deactivate_promo_code(&self, id: Uuid) -> Result<PromoCodeModel, ServiceError> {
        self.update_promo_code(
            id,
            UpdatePromoCodeInput {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn get_promo_code(&self, id: Uuid) -> Result<PromoCodeModel, ServiceError> {
        PromoCode::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::PromoNotFound)
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<PromoCodeModel>, ServiceError> {
        Ok(PromoCode::find()
            .filter(promo_code::Column::Code.eq(code))
            .one(&*self.db)
            .await?)
    }

    pub async fn list_promo_codes(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<PromoCodeModel>, u64), ServiceError> {
        let paginator = PromoCode::find()
            .order_by_desc(promo_code::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }

    /// Read-only validation probe. Advisory: the answer can change between
    /// this call and checkout, which re-validates inside its transaction.
    #[instrument(skip(self))]
    pub async fn validate(&self, code: &str) -> Result<PromoValidation, ServiceError> {
        let promo = self.get_by_code(code).await?;
        Ok(PromoValidation::evaluate(promo, Utc::now()))
    }

    /// Consumes one use of a promo code inside the caller's transaction.
    ///
    /// The increment is a single conditional update guarded by the usage
    /// limit, so two concurrent checkouts racing for the last use cannot
    /// both win: the loser sees zero rows affected and gets
    /// `PromoLimitReached`. The immutable usage row is written in the same
    /// transaction.
    pub async fn redeem_within<C: ConnectionTrait>(
        &self,
        conn: &C,
        promo: &PromoCodeModel,
        redemption: PromoRedemption,
    ) -> Result<(), ServiceError> {
        let result = PromoCode::update_many()
            .col_expr(
                promo_code::Column::UsageCount,
                Expr::col(promo_code::Column::UsageCount).add(1),
            )
            .col_expr(promo_code::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(promo_code::Column::Id.eq(promo.id))
            .filter(promo_code::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(promo_code::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(promo_code::Column::UsageCount)
                            .lt(Expr::col(promo_code::Column::UsageLimit)),
                    ),
            )
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::PromoLimitReached);
        }

        let usage = promo_code_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            promo_code_id: Set(promo.id),
            user_id: Set(redemption.user_id),
            cart_id: Set(redemption.cart_id),
            order_id: Set(redemption.order_id),
            discount_amount: Set(redemption.discount_amount),
            order_total: Set(redemption.order_total),
            created_at: Set(Utc::now()),
        };
        usage.insert(conn).await?;

        info!(
            "redeemed promo code {} for order {}",
            promo.code, redemption.order_id
        );
        Ok(())
    }
}

fn validate_percent(percent: Decimal) -> Result<(), ServiceError> {
    if percent.is_sign_negative() || percent > Decimal::from(100) {
        return Err(ServiceError::InvalidInput(format!(
            "discount percentage out of range: {}",
            percent
        )));
    }
    Ok(())
}

/// Input for creating a promo code
#[derive(Debug, Deserialize)]
pub struct CreatePromoCodeInput {
    pub code: String,
    pub discount_percent: Decimal,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub is_active: Option<bool>,
}

/// Input for updating a promo code; `None` fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePromoCodeInput {
    pub discount_percent: Option<Decimal>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
    pub usage_limit: Option<Option<i32>>,
}

/// Context recorded with a successful redemption.
#[derive(Debug, Clone)]
pub struct PromoRedemption {
    pub order_id: Uuid,
    pub user_id: Option<Uuid>,
    pub cart_id: Option<Uuid>,
    pub discount_amount: Decimal,
    pub order_total: Decimal,
}
