use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Fixed primary key of the singleton settings row.
pub const SETTINGS_ROW_ID: i32 = 1;

/// Store-wide commerce policy, a single row mutated only by administrators.
///
/// The engine reads it inside checkout and delivery transactions so a
/// policy change takes effect on the next operation, never mid-flight.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "store_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub enforce_minimum_order: bool,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub minimum_order_amount: Decimal,
    /// Percentage of the order total credited as a bonus on delivery.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub bonus_percent: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub minimum_order_for_bonus: Decimal,
    pub restore_stock_on_cancel: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
