//! # Auction Sweeper
//!
//! Optional background task that finalizes windowed auctions once their end
//! time has passed. Expiry is also enforced lazily by every bid and
//! finalize, so the sweeper only makes sure nobody has to ask.
//!
//! ## Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tokio::select! {                                                       │
//! │      interval.tick()   ──► sweep_once(book)                             │
//! │      sweep_rx.recv()   ──► sweep_once(book), reply on oneshot           │
//! │      shutdown_rx.recv()──► break                                        │
//! │  }                                                                      │
//! │                                                                         │
//! │  sweep_once:                                                            │
//! │    for id in book.expired_ids()                                         │
//! │      finalize(id, Expiry)                                               │
//! │        AlreadyFinalized or ConcurrencyConflict                          │
//! │                         → someone beat us to it, fine                   │
//! │        other error      → logged, retried on the next tick              │
//! │    prune finalized auctions from memory                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use bazaar_core::auction::FinalizeTrigger;
use bazaar_core::CoreError;

use crate::auctions::AuctionBook;
use crate::config::AuctionSettings;
use crate::error::{EngineError, EngineResult};

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub finalized: usize,
    pub failed: usize,
}

/// Finalizes every expired auction once.
pub fn sweep_once(book: &AuctionBook) -> SweepReport {
    let mut report = SweepReport::default();

    for id in book.expired_ids() {
        match book.finalize(id, FinalizeTrigger::Expiry) {
            Ok(_) => report.finalized += 1,
            Err(EngineError::Core(CoreError::AlreadyFinalized(_)))
            | Err(EngineError::Core(CoreError::ConcurrencyConflict { .. })) => {
                debug!(auction_id = %id, "Auction finalized concurrently");
            }
            Err(err) => {
                warn!(auction_id = %id, %err, "Failed to finalize expired auction");
                report.failed += 1;
            }
        }
    }

    let pruned = book.prune_finalized();
    if report.finalized > 0 || report.failed > 0 {
        info!(
            finalized = report.finalized,
            failed = report.failed,
            pruned,
            "Expired auction sweep"
        );
    }
    report
}

// =============================================================================
// Sweeper Task
// =============================================================================

pub struct AuctionSweeper {
    book: Arc<AuctionBook>,

    interval: Duration,

    /// On-demand sweep requests.
    sweep_rx: mpsc::Receiver<oneshot::Sender<SweepReport>>,

    /// Shutdown receiver.
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the sweeper.
#[derive(Clone)]
pub struct SweeperHandle {
    sweep_tx: mpsc::Sender<oneshot::Sender<SweepReport>>,
    shutdown_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    /// Runs a sweep now and waits for its report.
    pub async fn sweep_now(&self) -> EngineResult<SweepReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sweep_tx
            .send(reply_tx)
            .await
            .map_err(|_| EngineError::ChannelError("Sweep channel closed".into()))?;
        reply_rx.await.map_err(|_| EngineError::ShuttingDown)
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EngineError::ChannelError("Shutdown channel closed".into()))
    }
}

impl AuctionSweeper {
    pub fn new(book: Arc<AuctionBook>, interval: Duration) -> (Self, SweeperHandle) {
        let (sweep_tx, sweep_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let sweeper = AuctionSweeper {
            book,
            interval,
            sweep_rx,
            shutdown_rx,
        };
        (sweeper, SweeperHandle { sweep_tx, shutdown_tx })
    }

    /// Spawns the sweeper on the current Tokio runtime.
    pub fn spawn(book: Arc<AuctionBook>, settings: &AuctionSettings) -> (JoinHandle<()>, SweeperHandle) {
        let (sweeper, handle) = Self::new(book, settings.sweep_interval());
        (tokio::spawn(sweeper.run()), handle)
    }

    /// Runs the sweep loop until shutdown.
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Auction sweeper starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    sweep_once(&self.book);
                }

                Some(reply) = self.sweep_rx.recv() => {
                    let report = sweep_once(&self.book);
                    if reply.send(report).is_err() {
                        error!("Sweep requester went away before the report");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Auction sweeper shutting down");
                    break;
                }
            }
        }

        info!("Auction sweeper stopped");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
