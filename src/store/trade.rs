mod postgres;

pub use self::postgres::*;

use super::newest_first;
use crate::persistence::{
    InMemoryPersistence, InMemoryTable, InMemoryTransaction, Persistence, TransactionOf,
};
use crate::trade::TransactionRecord;
use crate::types::*;
use anyhow::Result;
use std::sync::Arc;

/// Completed sales
pub trait TradeStore {
    type Persistence: Persistence;

    fn insert_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        record: &TransactionRecord,
    ) -> Result<()>;

    fn load_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        id: TransactionIdRef,
    ) -> Result<Option<TransactionRecord>>;

    /// The settlement of an auction, if it already happened
    fn find_by_auction_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        auction_id: AuctionIdRef,
    ) -> Result<Option<TransactionRecord>>;

    /// Transactions where the user is the buyer or the seller, newest first
    fn list_for_user_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        user_id: UserIdRef,
    ) -> Result<Vec<TransactionRecord>>;
}

pub type SharedTradeStore<P> = Arc<dyn TradeStore<Persistence = P> + Send + Sync>;

#[derive(Default)]
pub struct InMemoryTradeStore {
    records: InMemoryTable<TransactionId, TransactionRecord>,
}

impl InMemoryTradeStore {
    pub fn new_shared() -> SharedTradeStore<InMemoryPersistence> {
        Arc::new(Self::default())
    }
}

impl TradeStore for InMemoryTradeStore {
    type Persistence = InMemoryPersistence;

    fn insert_tr<'a>(
        &self,
        conn: &mut InMemoryTransaction<'a>,
        record: &TransactionRecord,
    ) -> Result<()> {
        self.records.insert(conn, record.id.clone(), record.clone());
        Ok(())
    }

    fn load_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        id: TransactionIdRef,
    ) -> Result<Option<TransactionRecord>> {
        Ok(self.records.get(id))
    }

    fn find_by_auction_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        auction_id: AuctionIdRef,
    ) -> Result<Option<TransactionRecord>> {
        Ok(self
            .records
            .filter(|r| r.auction_id.as_deref() == Some(auction_id))
            .into_iter()
            .next())
    }

    fn list_for_user_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        user_id: UserIdRef,
    ) -> Result<Vec<TransactionRecord>> {
        let mut records = self.records.filter(|r| r.involves(user_id));
        newest_first(&mut records, |r| (r.created_at, r.id.as_str()));
        Ok(records)
    }
}
