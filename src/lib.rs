//! Commerce transaction engine for an e-commerce storefront.
//!
//! This crate owns the part of the store where bugs make money wrong:
//! cart pricing, promo-code validation and redemption, cart-to-order
//! checkout, the order status state machine, and the append-only wallet
//! bonus ledger. The HTTP surface, authentication and catalog management
//! live in other services and call into this one.
//!
//! Cross-request invariants (promo usage under its limit, stock never
//! negative, wallet balances forming an unbroken chain) are enforced with
//! conditional updates at the storage layer; checkout and status
//! transitions each run as a single transaction that commits fully or not
//! at all.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use services::{
    CartService, CheckoutService, OrderService, PromoCodeService, SettingsService, WalletService,
};

/// All engine services wired over one connection pool and event channel.
#[derive(Clone)]
pub struct Engine {
    pub db: Arc<DatabaseConnection>,
    pub event_sender: Arc<events::EventSender>,
    pub promo_codes: Arc<PromoCodeService>,
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub wallet: WalletService,
    pub settings: SettingsService,
}

impl Engine {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: events::EventSender) -> Self {
        let event_sender = Arc::new(event_sender);
        let promo_codes = Arc::new(PromoCodeService::new(db.clone()));

        Self {
            carts: CartService::new(db.clone(), event_sender.clone(), promo_codes.clone()),
            checkout: CheckoutService::new(db.clone(), event_sender.clone(), promo_codes.clone()),
            orders: OrderService::new(db.clone(), event_sender.clone()),
            wallet: WalletService::new(db.clone(), event_sender.clone()),
            settings: SettingsService::new(db.clone()),
            promo_codes,
            event_sender,
            db,
        }
    }
}
