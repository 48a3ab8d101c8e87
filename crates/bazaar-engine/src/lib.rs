//! # bazaar-engine: Concurrent Marketplace Services
//!
//! This crate runs the pure rules of `bazaar-core` under many concurrent
//! request handlers: shared discount sets, contended auctions, atomic stock
//! and a two-phase checkout.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Engine Architecture                              │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    Marketplace (wiring facade)                   │  │
//! │  │  Built from EngineConfig + Ports (catalog, stores, payments,    │  │
//! │  │  clock). Hands out Arc'd services to request handlers.          │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │DiscountRegistry│  │ CheckoutService│  │     AuctionBook        │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Arc snapshot   │  │ quote, reserve │  │ Mutex per auction,     │    │
//! │  │ per shop, swap │  │ charge, commit │  │ bids, finalize with    │    │
//! │  │ on write       │  │ or roll back   │  │ stock reservation      │    │
//! │  └────────────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │                              ▼                       ▼                  │
//! │                     ┌──────────────────────────────────────┐            │
//! │                     │  StockLedger (AtomicI64 per item,    │            │
//! │                     │  CAS decrement, RAII Reservation)    │            │
//! │                     └──────────────────────────────────────┘            │
//! │                                                                         │
//! │  AuctionSweeper: optional Tokio task finalizing expired auctions       │
//! │  EventBus: broadcast of bid / auction / purchase / discount events     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Services
//! - [`discounts`] - Per-shop discount sets behind snapshot-and-swap
//! - [`auctions`] - Auction book with per-auction locking
//! - [`stock`] - Atomic stock counters and reservations
//! - [`checkout`] - Cart quotes and two-phase checkout
//! - [`sweeper`] - Background expiry sweeper
//! - [`market`] - Wiring facade
//!
//! ### Ports
//! - [`catalog`] - Base prices and categories
//! - [`store`] - Discount and purchase persistence
//! - [`payment`] - Charges and refunds
//! - [`clock`] - Current time
//! - [`events`] - Outgoing notifications
//!
//! ### Ambient
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bazaar_engine::{EngineConfig, InMemoryCatalog, Marketplace, Ports};
//!
//! let config = EngineConfig::load_or_default(None);
//! let market = Marketplace::new(config, Ports::in_memory(catalog))?;
//!
//! let quote = market.checkout().quote(&cart)?;
//! let receipts = market.checkout().checkout(user, &cart, address)?;
//!
//! let auction = market.open_auction(owner, shop, items, None, None)?;
//! market.auctions().post_bid(auction, bidder, Money::from_cents(12_000))?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Services
pub mod auctions;
pub mod checkout;
pub mod discounts;
pub mod market;
pub mod stock;
pub mod sweeper;

// Ports
pub mod catalog;
pub mod clock;
pub mod events;
pub mod payment;
pub mod store;

// Ambient
pub mod config;
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

pub use auctions::AuctionBook;
pub use catalog::{Catalog, InMemoryCatalog};
pub use checkout::{CartQuote, CheckoutService, ShopQuote};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuctionSettings, EngineConfig, EventSettings, PricingSettings, ReservationSettings};
pub use discounts::DiscountRegistry;
pub use error::{EngineError, EngineResult};
pub use events::{EventBus, MarketEvent};
pub use market::{Marketplace, Ports};
pub use payment::{AcceptAllPayments, PaymentGateway, PaymentId};
pub use stock::{Reservation, StockLedger};
pub use store::{DiscountStore, InMemoryStore, PurchaseStore, StoreError, StoreResult};
pub use sweeper::{AuctionSweeper, SweepReport, SweeperHandle};
