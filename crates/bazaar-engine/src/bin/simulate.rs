//! # simulate
//!
//! Drives the engine end to end with in-memory ports:
//!
//! ```text
//! 1. catalog + stock for two shops
//! 2. discounts: additive 10% on a lamp, multiplicative 20% store-wide
//! 3. quote + checkout across both shops
//! 4. contended auction: N bidder threads, strictly increasing amounts
//!    submitted out of order
//! 5. finalize by a shop manager, print the receipt
//! ```
//!
//! Log level follows `RUST_LOG` (default `info,bazaar_engine=debug`).

use std::sync::Arc;
use std::thread;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bazaar_core::auction::FinalizeTrigger;
use bazaar_core::discount::{Discount, DiscountTarget, Stacking};
use bazaar_core::policy::PolicyNode;
use bazaar_core::{Cart, ItemCategory, ItemId, ItemQuantities, Money, ShippingAddress, ShopId, UserId};
use bazaar_engine::{EngineConfig, EngineResult, InMemoryCatalog, MarketEvent, Marketplace, Ports};

const LAMPS: ShopId = ShopId::new(1);
const BOOKS: ShopId = ShopId::new(2);

const LAMP: ItemId = ItemId::new(100);
const BULB: ItemId = ItemId::new(101);
const NOVEL: ItemId = ItemId::new(200);

const OWNER: UserId = UserId::new(1);
const MANAGER: UserId = UserId::new(2);
const BUYER: UserId = UserId::new(10);

const BIDDERS: u64 = 8;

#[tokio::main]
async fn main() -> EngineResult<()> {
    init_tracing();

    let config = EngineConfig::load_or_default(None);
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.add_item(LAMPS, LAMP, ItemCategory::Electronics, Money::from_cents(10_000))?;
    catalog.add_item(LAMPS, BULB, ItemCategory::Electronics, Money::from_cents(450))?;
    catalog.add_item(BOOKS, NOVEL, ItemCategory::Books, Money::from_cents(1_999))?;

    let market = Marketplace::new(config, Ports::in_memory(catalog))?;
    let sweeper = market.start_sweeper();
    let mut events = market.events().subscribe();

    market.stock().restock(LAMPS, LAMP, 5)?;
    market.stock().restock(LAMPS, BULB, 50)?;
    market.stock().restock(BOOKS, NOVEL, 3)?;

    // -------------------------------------------------------------------------
    // Discounts
    // -------------------------------------------------------------------------
    market.discounts().add(
        LAMPS,
        Discount::new(
            DiscountTarget::Item(LAMP),
            10,
            Stacking::Additive,
            PolicyNode::unconditional(),
        )?,
    )?;
    market.discounts().add(
        LAMPS,
        Discount::new(
            DiscountTarget::Global,
            20,
            Stacking::Multiplicative,
            PolicyNode::basket_value_at_least(Money::from_cents(5_000))?,
        )?,
    )?;

    // -------------------------------------------------------------------------
    // Quote + checkout
    // -------------------------------------------------------------------------
    let cart = Cart::new()
        .with(LAMPS, LAMP, 1)?
        .with(LAMPS, BULB, 4)?
        .with(BOOKS, NOVEL, 2)?;

    let quote = market.checkout().quote(&cart)?;
    for shop in &quote.shops {
        info!(
            shop = %shop.shop,
            base = %shop.quote.base_total,
            discounted = %shop.quote.discounted_total,
            savings = %shop.quote.savings,
            "Quote"
        );
    }
    info!(total = %quote.total, "Cart total");

    let address = ShippingAddress {
        country: "IL".into(),
        city: "Tel Aviv".into(),
        street: "Rothschild 1".into(),
        zip_code: "6688101".into(),
    };
    let receipts = market.checkout().checkout(BUYER, &cart, address)?;
    for receipt in &receipts {
        info!(purchase_id = %receipt.purchase_id, shop = %receipt.shop, price = %receipt.final_price, "Receipt");
    }

    // -------------------------------------------------------------------------
    // Contended auction
    // -------------------------------------------------------------------------
    let lot: ItemQuantities = [(LAMP, 1)].into_iter().collect();
    let auction = market.open_auction(OWNER, LAMPS, lot, None, None)?;
    let opening = market.auctions().view(auction)?.initial_price;
    info!(auction_id = %auction, opening = %opening, "Auction opened at reference price");

    let book = market.auctions().clone();
    thread::scope(|scope| {
        // Highest amounts go to the threads spawned first
        for n in (1..=BIDDERS).rev() {
            let book = Arc::clone(&book);
            scope.spawn(move || {
                let amount = opening + Money::from_cents(100 * n as i64);
                if let Err(err) = book.post_bid(auction, UserId::new(100 + n), amount) {
                    warn!(bidder = 100 + n, amount = %amount, %err, "Bid lost");
                }
            });
        }
    });

    let view = market.auctions().view(auction)?;
    info!(
        highest = %view.highest_bid,
        bidder = ?view.highest_bidder,
        accepted = view.bid_count,
        "Bidding settled"
    );

    let receipt = market
        .auctions()
        .finalize(auction, FinalizeTrigger::Manual { by: MANAGER })?;
    info!(
        winner = ?receipt.winner,
        price = %receipt.final_price,
        lamps_left = market.stock().available(LAMPS, LAMP),
        "Auction receipt"
    );

    let mut resolved = 0;
    while let Ok(event) = events.try_recv() {
        if let MarketEvent::AuctionResolved { .. } = event {
            resolved += 1;
        }
    }
    info!(resolved, "Events drained");

    if let Some((task, handle)) = sweeper {
        handle.shutdown().await?;
        if let Err(err) = task.await {
            warn!(%err, "Sweeper task ended abnormally");
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bazaar_engine=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();
}
