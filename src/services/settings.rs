use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{sea_query::OnConflict, ConnectionTrait, DatabaseConnection, EntityTrait, Set};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    entities::{store_settings, StoreSettings, StoreSettingsModel, SETTINGS_ROW_ID},
    errors::ServiceError,
};

/// Store-wide policy settings: minimum order enforcement, delivery bonus,
/// and cancellation stock restore. One row, written by the admin surface and
/// read by checkout and the order lifecycle inside their transactions.
#[derive(Clone)]
pub struct SettingsService {
    db: Arc<DatabaseConnection>,
}

impl SettingsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Current settings, falling back to defaults when the row was never
    /// written.
    pub async fn get(&self) -> Result<StoreSettingsModel, ServiceError> {
        load(&*self.db).await
    }

    /// Updates the singleton row, creating it on first write. `None` fields
    /// keep their current value.
    #[instrument(skip(self))]
    pub async fn update(
        &self,
        input: UpdateSettingsInput,
    ) -> Result<StoreSettingsModel, ServiceError> {
        if let Some(amount) = input.minimum_order_amount {
            if amount.is_sign_negative() {
                return Err(ServiceError::InvalidInput(
                    "minimum order amount must not be negative".to_string(),
                ));
            }
        }
        if let Some(percent) = input.bonus_percent {
            if percent.is_sign_negative() || percent > Decimal::from(100) {
                return Err(ServiceError::InvalidInput(format!(
                    "bonus percentage out of range: {}",
                    percent
                )));
            }
        }
        if let Some(minimum) = input.minimum_order_for_bonus {
            if minimum.is_sign_negative() {
                return Err(ServiceError::InvalidInput(
                    "minimum order for bonus must not be negative".to_string(),
                ));
            }
        }

        // Single upsert; on conflict only the columns the input actually
        // carries are overwritten, so two concurrent partial updates cannot
        // clobber each other's fields. Absent fields fall back to defaults
        // only when the row is first created.
        let defaults = default_settings();
        let row = store_settings::ActiveModel {
            id: Set(SETTINGS_ROW_ID),
            enforce_minimum_order: Set(input
                .enforce_minimum_order
                .unwrap_or(defaults.enforce_minimum_order)),
            minimum_order_amount: Set(input
                .minimum_order_amount
                .unwrap_or(defaults.minimum_order_amount)),
            bonus_percent: Set(input.bonus_percent.unwrap_or(defaults.bonus_percent)),
            minimum_order_for_bonus: Set(input
                .minimum_order_for_bonus
                .unwrap_or(defaults.minimum_order_for_bonus)),
            restore_stock_on_cancel: Set(input
                .restore_stock_on_cancel
                .unwrap_or(defaults.restore_stock_on_cancel)),
            updated_at: Set(Utc::now()),
        };

        let mut changed = vec![store_settings::Column::UpdatedAt];
        if input.enforce_minimum_order.is_some() {
            changed.push(store_settings::Column::EnforceMinimumOrder);
        }
        if input.minimum_order_amount.is_some() {
            changed.push(store_settings::Column::MinimumOrderAmount);
        }
        if input.bonus_percent.is_some() {
            changed.push(store_settings::Column::BonusPercent);
        }
        if input.minimum_order_for_bonus.is_some() {
            changed.push(store_settings::Column::MinimumOrderForBonus);
        }
        if input.restore_stock_on_cancel.is_some() {
            changed.push(store_settings::Column::RestoreStockOnCancel);
        }

        StoreSettings::insert(row)
            .on_conflict(
                OnConflict::column(store_settings::Column::Id)
                    .update_columns(changed)
                    .to_owned(),
            )
            .exec(&*self.db)
            .await?;

        let updated = load(&*self.db).await?;
        info!("store settings updated");
        Ok(updated)
    }
}

/// Loads settings inside any connection or transaction, defaulting when the
/// row is absent.
pub(crate) async fn load<C: ConnectionTrait>(conn: &C) -> Result<StoreSettingsModel, ServiceError> {
    let settings = StoreSettings::find_by_id(SETTINGS_ROW_ID).one(conn).await?;
    Ok(settings.unwrap_or_else(default_settings))
}

fn default_settings() -> StoreSettingsModel {
    StoreSettingsModel {
        id: SETTINGS_ROW_ID,
        enforce_minimum_order: false,
        minimum_order_amount: Decimal::ZERO,
        bonus_percent: Decimal::ZERO,
        minimum_order_for_bonus: Decimal::ZERO,
        restore_stock_on_cancel: true,
        updated_at: Utc::now(),
    }
}

/// Input for updating store settings; `None` fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsInput {
    pub enforce_minimum_order: Option<bool>,
    pub minimum_order_amount: Option<Decimal>,
    pub bonus_percent: Option<Decimal>,
    pub minimum_order_for_bonus: Option<Decimal>,
    pub restore_stock_on_cancel: Option<bool>,
}
