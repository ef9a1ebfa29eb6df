mod postgres;

pub use self::postgres::*;

use super::{newest_first, page};
use crate::listing::{Listing, ListingFilter};
use crate::persistence::{
    InMemoryPersistence, InMemoryTable, InMemoryTransaction, Persistence, TransactionOf,
};
use crate::types::*;
use anyhow::Result;
use std::sync::Arc;

pub trait ListingStore {
    type Persistence: Persistence;

    fn insert_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        listing: &Listing,
    ) -> Result<()>;

    fn load_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        id: ListingIdRef,
    ) -> Result<Option<Listing>>;

    /// Like `load_tr`, but the row stays locked until the end of the
    /// transaction where the backend supports it
    fn lock_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        id: ListingIdRef,
    ) -> Result<Option<Listing>>;

    fn update_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        listing: &Listing,
    ) -> Result<()>;

    fn list_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        filter: &ListingFilter,
    ) -> Result<Vec<Listing>>;
}

pub type SharedListingStore<P> = Arc<dyn ListingStore<Persistence = P> + Send + Sync>;

#[derive(Default)]
pub struct InMemoryListingStore {
    listings: InMemoryTable<ListingId, Listing>,
}

impl InMemoryListingStore {
    pub fn new_shared() -> SharedListingStore<InMemoryPersistence> {
        Arc::new(Self::default())
    }
}

impl ListingStore for InMemoryListingStore {
    type Persistence = InMemoryPersistence;

    fn insert_tr<'a>(&self, conn: &mut InMemoryTransaction<'a>, listing: &Listing) -> Result<()> {
        self.listings
            .insert(conn, listing.id.clone(), listing.clone());
        Ok(())
    }

    fn load_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        id: ListingIdRef,
    ) -> Result<Option<Listing>> {
        Ok(self.listings.get(id))
    }

    fn lock_tr<'a>(
        &self,
        conn: &mut InMemoryTransaction<'a>,
        id: ListingIdRef,
    ) -> Result<Option<Listing>> {
        self.load_tr(conn, id)
    }

    fn update_tr<'a>(&self, conn: &mut InMemoryTransaction<'a>, listing: &Listing) -> Result<()> {
        self.listings
            .insert(conn, listing.id.clone(), listing.clone());
        Ok(())
    }

    fn list_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        filter: &ListingFilter,
    ) -> Result<Vec<Listing>> {
        let mut listings = self.listings.filter(|l| filter.matches(l));
        newest_first(&mut listings, |l| (l.created_at, l.id.as_str()));
        Ok(page(listings, filter.offset, filter.page_size()))
    }
}
