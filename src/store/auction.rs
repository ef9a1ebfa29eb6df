mod postgres;

pub use self::postgres::*;

use super::{newest_first, page};
use crate::auction::{Auction, AuctionFilter, AuctionStatus, Bid};
use crate::persistence::{
    InMemoryPersistence, InMemoryTable, InMemoryTransaction, Persistence, TransactionOf,
};
use crate::types::*;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Auctions and their bids
pub trait AuctionStore {
    type Persistence: Persistence;

    fn insert_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        auction: &Auction,
    ) -> Result<()>;

    fn load_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        id: AuctionIdRef,
    ) -> Result<Option<Auction>>;

    /// Like `load_tr`, but the row stays locked until the end of the
    /// transaction where the backend supports it
    fn lock_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        id: AuctionIdRef,
    ) -> Result<Option<Auction>>;

    /// Compare-and-swap: store `auction` only if the stored version is
    /// still `expected_version`. Returns `false` if it was not.
    fn update_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        auction: &Auction,
        expected_version: u64,
    ) -> Result<bool>;

    fn list_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        filter: &AuctionFilter,
    ) -> Result<Vec<Auction>>;

    /// Scheduled auctions whose start time has come
    fn due_to_start_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Auction>>;

    /// Live auctions whose end time has passed
    fn due_to_close_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Auction>>;

    fn insert_bid_tr<'a>(&self, conn: &mut TransactionOf<'a, Self::Persistence>, bid: &Bid)
        -> Result<()>;

    /// Bids of an auction, highest first
    fn bids_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        auction_id: AuctionIdRef,
    ) -> Result<Vec<Bid>>;
}

pub type SharedAuctionStore<P> = Arc<dyn AuctionStore<Persistence = P> + Send + Sync>;

#[derive(Default)]
pub struct InMemoryAuctionStore {
    auctions: InMemoryTable<AuctionId, Auction>,
    bids: InMemoryTable<(AuctionId, BidId), Bid>,
}

impl InMemoryAuctionStore {
    pub fn new_shared() -> SharedAuctionStore<InMemoryPersistence> {
        Arc::new(Self::default())
    }

    fn with_status(&self, status: AuctionStatus, f: impl Fn(&Auction) -> bool) -> Vec<Auction> {
        let mut auctions = self.auctions.filter(|a| a.status == status && f(a));
        auctions.sort_by(|a, b| (a.end_time, &a.id).cmp(&(b.end_time, &b.id)));
        auctions
    }
}

impl AuctionStore for InMemoryAuctionStore {
    type Persistence = InMemoryPersistence;

    fn insert_tr<'a>(&self, conn: &mut InMemoryTransaction<'a>, auction: &Auction) -> Result<()> {
        self.auctions
            .insert(conn, auction.id.clone(), auction.clone());
        Ok(())
    }

    fn load_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        id: AuctionIdRef,
    ) -> Result<Option<Auction>> {
        Ok(self.auctions.get(id))
    }

    fn lock_tr<'a>(
        &self,
        conn: &mut InMemoryTransaction<'a>,
        id: AuctionIdRef,
    ) -> Result<Option<Auction>> {
        self.load_tr(conn, id)
    }

    fn update_tr<'a>(
        &self,
        conn: &mut InMemoryTransaction<'a>,
        auction: &Auction,
        expected_version: u64,
    ) -> Result<bool> {
        match self.auctions.get(&auction.id) {
            Some(stored) if stored.version == expected_version => {
                self.auctions
                    .insert(conn, auction.id.clone(), auction.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn list_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        filter: &AuctionFilter,
    ) -> Result<Vec<Auction>> {
        let mut auctions = self.auctions.filter(|a| filter.matches(a));
        newest_first(&mut auctions, |a| (a.created_at, a.id.as_str()));
        Ok(page(auctions, filter.offset, filter.page_size()))
    }

    fn due_to_start_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Auction>> {
        Ok(self.with_status(AuctionStatus::Scheduled, |a| a.start_time <= now))
    }

    fn due_to_close_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Auction>> {
        Ok(self.with_status(AuctionStatus::Live, |a| a.is_expired_at(now)))
    }

    fn insert_bid_tr<'a>(&self, conn: &mut InMemoryTransaction<'a>, bid: &Bid) -> Result<()> {
        self.bids.insert(
            conn,
            (bid.auction_id.clone(), bid.id.clone()),
            bid.clone(),
        );
        Ok(())
    }

    fn bids_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        auction_id: AuctionIdRef,
    ) -> Result<Vec<Bid>> {
        let mut bids = self.bids.filter(|b| b.auction_id == auction_id);
        bids.sort_by(|a, b| b.amount.cmp(&a.amount).then(b.placed_at.cmp(&a.placed_at)));
        Ok(bids)
    }
}
