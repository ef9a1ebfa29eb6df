use super::{AuctionEngine, LoopService};
use crate::persistence::Persistence;
use anyhow::Result;
use std::time::Duration;
use tracing::info;

/// Starts and closes auctions when their time comes
pub struct Scheduler<P: Persistence> {
    engine: AuctionEngine<P>,
    tick: Duration,
}

impl<P: Persistence> Scheduler<P> {
    pub fn new(engine: AuctionEngine<P>, tick: Duration) -> Self {
        Self { engine, tick }
    }
}

impl<P: Persistence> LoopService for Scheduler<P> {
    fn run_iteration(&mut self) -> Result<()> {
        std::thread::sleep(self.tick);

        let started = self.engine.start_due()?;
        let closed = self.engine.close_due()?;
        if started.started + started.cancelled + closed.closed != 0 {
            info!(
                started = started.started,
                cancelled = started.cancelled,
                closed = closed.closed,
                "scheduler pass"
            );
        }
        Ok(())
    }
}
