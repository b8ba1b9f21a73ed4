//! Service layer of the commerce transaction engine.

pub mod carts;
pub mod checkout;
pub mod orders;
pub mod pricing;
pub mod promo_codes;
pub mod settings;
pub mod wallet;

pub use carts::{AddItemInput, CartService, CartView, CreateCartInput};
pub use checkout::{CheckoutInput, CheckoutService};
pub use orders::{OrderService, OrderView};
pub use pricing::{price_lines, PricingBreakdown};
pub use promo_codes::{
    CreatePromoCodeInput, PromoCodeService, PromoValidation, UpdatePromoCodeInput,
};
pub use settings::{SettingsService, UpdateSettingsInput};
pub use wallet::WalletService;
