//! # Marketplace
//!
//! Wires the engine services together from an [`EngineConfig`] and the
//! collaborator ports.
//!
//! ```text
//!             ┌──────────────────────── Ports ────────────────────────┐
//!             │ catalog  discount_store  purchase_store  payments  clock│
//!             └───┬──────────┬───────────────┬────────────┬───────┬───┘
//!                 │          │               │            │       │
//!  EngineConfig ──┼──► DiscountRegistry      │            │       │
//!                 │          │               │            │       │
//!                 └──► CheckoutService ◄─────┴────────────┴───────┤
//!                            │                                    │
//!                       StockLedger ◄──── AuctionBook ◄───────────┘
//!                                              │
//!                                         AuctionSweeper (optional)
//!
//!  Every service publishes to the same EventBus.
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::info;

use bazaar_core::auction::NewAuction;
use bazaar_core::{ItemQuantities, Money, PurchaseId, ShopId, UserId};

use crate::auctions::AuctionBook;
use crate::catalog::{Catalog, InMemoryCatalog};
use crate::checkout::CheckoutService;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::discounts::DiscountRegistry;
use crate::error::EngineResult;
use crate::events::EventBus;
use crate::payment::{AcceptAllPayments, PaymentGateway};
use crate::stock::StockLedger;
use crate::store::{DiscountStore, InMemoryStore, PurchaseStore};
use crate::sweeper::{AuctionSweeper, SweeperHandle};

/// Implementations of everything the engine consumes.
#[derive(Clone)]
pub struct Ports {
    pub catalog: Arc<dyn Catalog>,
    pub discount_store: Arc<dyn DiscountStore>,
    pub purchase_store: Arc<dyn PurchaseStore>,
    pub payments: Arc<dyn PaymentGateway>,
    pub clock: Arc<dyn Clock>,
}

impl Ports {
    /// In-memory stores, an approving gateway and the system clock.
    pub fn in_memory(catalog: Arc<InMemoryCatalog>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Ports {
            catalog,
            discount_store: store.clone(),
            purchase_store: store,
            payments: Arc::new(AcceptAllPayments::new()),
            clock: Arc::new(SystemClock),
        }
    }
}

pub struct Marketplace {
    config: EngineConfig,
    events: EventBus,
    discounts: Arc<DiscountRegistry>,
    stock: Arc<StockLedger>,
    auctions: Arc<AuctionBook>,
    checkout: CheckoutService,
}

impl Marketplace {
    pub fn new(config: EngineConfig, ports: Ports) -> EngineResult<Self> {
        config.validate()?;

        let events = EventBus::new(config.events.channel_capacity);
        let discounts = Arc::new(DiscountRegistry::new(
            ports.discount_store,
            events.clone(),
            config.pricing.max_discounts_per_shop,
        ));
        let stock = Arc::new(StockLedger::new(config.reservation.max_cas_retries));
        let auctions = Arc::new(AuctionBook::new(
            stock.clone(),
            ports.purchase_store.clone(),
            ports.clock.clone(),
            events.clone(),
        ));
        let checkout = CheckoutService::new(
            ports.catalog,
            discounts.clone(),
            stock.clone(),
            ports.payments,
            ports.purchase_store,
            ports.clock,
            events.clone(),
        );

        info!(
            sweep_enabled = config.auction.sweep_enabled,
            max_discounts = config.pricing.max_discounts_per_shop,
            "Marketplace engine ready"
        );

        Ok(Marketplace {
            config,
            events,
            discounts,
            stock,
            auctions,
            checkout,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn discounts(&self) -> &Arc<DiscountRegistry> {
        &self.discounts
    }

    pub fn stock(&self) -> &Arc<StockLedger> {
        &self.stock
    }

    pub fn auctions(&self) -> &Arc<AuctionBook> {
        &self.auctions
    }

    pub fn checkout(&self) -> &CheckoutService {
        &self.checkout
    }

    /// Discounted price of a lot at the shop's current discounts.
    pub fn reference_price(&self, shop: ShopId, items: &ItemQuantities) -> EngineResult<Money> {
        Ok(self.checkout.quote_shop(shop, items)?.discounted_total)
    }

    /// Opens an auction. Without an explicit `initial_price` the lot starts
    /// at its [`reference_price`](Self::reference_price).
    pub fn open_auction(
        &self,
        initiator: UserId,
        shop: ShopId,
        items: ItemQuantities,
        initial_price: Option<Money>,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> EngineResult<PurchaseId> {
        let initial_price = match initial_price {
            Some(price) => price,
            None => self.reference_price(shop, &items)?,
        };
        self.auctions.open(NewAuction {
            initiator,
            shop,
            items,
            initial_price,
            start: window.map(|(start, _)| start),
            end: window.map(|(_, end)| end),
        })
    }

    /// Starts the expiry sweeper when enabled. Must be called inside a
    /// Tokio runtime.
    pub fn start_sweeper(&self) -> Option<(JoinHandle<()>, SweeperHandle)> {
        if !self.config.auction.sweep_enabled {
            info!("Auction sweeper disabled");
            return None;
        }
        Some(AuctionSweeper::spawn(
            self.auctions.clone(),
            &self.config.auction,
        ))
    }
}
