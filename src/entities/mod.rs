//! Database entities for the commerce transaction engine.

pub mod cart;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod product;
pub mod promo_code;
pub mod promo_code_usage;
pub mod store_settings;
pub mod user_wallet;
pub mod wallet_transaction;

// Re-export entities
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use promo_code::{Entity as PromoCode, Model as PromoCodeModel};
pub use promo_code_usage::{Entity as PromoCodeUsage, Model as PromoCodeUsageModel};
pub use store_settings::{Entity as StoreSettings, Model as StoreSettingsModel, SETTINGS_ROW_ID};
pub use user_wallet::{Entity as UserWallet, Model as UserWalletModel};
pub use wallet_transaction::{
    Entity as WalletTransaction, Model as WalletTransactionModel, TransactionKind,
};
