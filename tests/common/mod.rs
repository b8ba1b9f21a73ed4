use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Alias, ColumnDef, ColumnSpec, ColumnType, Table, TableCreateStatement},
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema, Set,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_engine::{
    entities::{self, product},
    events::{self, Event},
    services::CheckoutInput,
    Engine,
};

/// Test harness backed by an in-memory SQLite database with the schema
/// derived straight from the entities.
pub struct TestApp {
    pub engine: Engine,
    pub db: Arc<DatabaseConnection>,
    _event_rx: mpsc::Receiver<Event>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options.max_connections(1).min_connections(1);
        let db = Database::connect(options)
            .await
            .expect("failed to open in-memory sqlite");

        create_schema(&db).await;

        let db = Arc::new(db);
        let (event_sender, event_rx) = events::channel(64);
        let engine = Engine::new(db.clone(), event_sender);

        Self {
            engine,
            db,
            _event_rx: event_rx,
        }
    }
}

async fn create_schema(db: &DatabaseConnection) {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let statements = vec![
        schema.create_table_from_entity(entities::Product),
        schema.create_table_from_entity(entities::Cart),
        schema.create_table_from_entity(entities::CartItem),
        schema.create_table_from_entity(entities::PromoCode),
        schema.create_table_from_entity(entities::PromoCodeUsage),
        schema.create_table_from_entity(entities::Order),
        schema.create_table_from_entity(entities::OrderItem),
        schema.create_table_from_entity(entities::UserWallet),
        schema.create_table_from_entity(entities::WalletTransaction),
        schema.create_table_from_entity(entities::StoreSettings),
    ];

    for statement in statements {
        let statement = clamp_decimal_precision(statement);
        db.execute(backend.build(&statement))
            .await
            .expect("failed to create table");
    }
}

/// sea-query's SQLite builder panics on DECIMAL columns with precision > 16.
/// SQLite stores the values through REAL affinity regardless of the declared
/// precision, so clamping it for the in-memory test schema is lossless.
fn clamp_decimal_precision(statement: TableCreateStatement) -> TableCreateStatement {
    let mut rebuilt = Table::create();
    if let Some(table) = statement.get_table_name() {
        rebuilt.table(table.clone());
    }
    for column in statement.get_columns() {
        let column_type = match column.get_column_type() {
            Some(ColumnType::Decimal(Some((precision, scale)))) if *precision > 16 => {
                ColumnType::Decimal(Some((16, *scale)))
            }
            Some(other) => other.clone(),
            None => ColumnType::Text,
        };
        let mut def = ColumnDef::new_with_type(Alias::new(column.get_column_name()), column_type);
        for spec in column.get_column_spec() {
            match spec {
                ColumnSpec::Null => def.null(),
                ColumnSpec::NotNull => def.not_null(),
                ColumnSpec::Default(expr) => def.default(expr.clone()),
                ColumnSpec::AutoIncrement => def.auto_increment(),
                ColumnSpec::UniqueKey => def.unique_key(),
                ColumnSpec::PrimaryKey => def.primary_key(),
                ColumnSpec::Check(expr) => def.check(expr.clone()),
                ColumnSpec::Extra(extra) => def.extra(extra.clone()),
                ColumnSpec::Comment(comment) => def.comment(comment.clone()),
                _ => &mut def,
            };
        }
        rebuilt.col(def);
    }
    for mut foreign_key in statement.get_foreign_key_create_stmts().clone() {
        rebuilt.foreign_key(&mut foreign_key);
    }
    for mut index in statement.get_indexes().clone() {
        rebuilt.index(&mut index);
    }
    rebuilt.take()
}

/// Inserts a product and returns its id.
#[allow(dead_code)]
pub async fn seed_product(app: &TestApp, name: &str, price: Decimal, stock: i32) -> Uuid {
    let id = Uuid::new_v4();
    let model = product::ActiveModel {
        id: Set(id),
        name: Set(name.to_string()),
        sku: Set(format!("SKU-{}", &id.simple().to_string()[..8].to_uppercase())),
        price: Set(price),
        stock_quantity: Set(stock),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    };
    model.insert(&*app.db).await.expect("failed to seed product");
    id
}

/// Checkout input with plausible delivery details.
#[allow(dead_code)]
pub fn checkout_input(user_id: Uuid, cart_id: Uuid) -> CheckoutInput {
    CheckoutInput {
        user_id,
        cart_id,
        delivery_name: "Alex Doe".to_string(),
        delivery_phone: "+1-555-0100".to_string(),
        delivery_address: "1 Main St, Springfield".to_string(),
        wallet_amount: None,
    }
}
