//! Stores for the marketplace entities
//!
//! Each store is a trait over one `Persistence`, with an in-memory
//! implementation next to the trait and a PostgreSQL one in a
//! submodule. Every operation runs inside a caller-provided transaction.
pub mod account;
pub mod auction;
pub mod favorite;
pub mod listing;
pub mod notification;
pub mod review;
pub mod trade;

pub use self::{
    account::*, auction::*, favorite::*, listing::*, notification::*, review::*, trade::*,
};

use crate::persistence::{InMemoryPersistence, Persistence, PostgresPersistence};
use crate::progress::{
    InMemoryProgressTracker, PostgresProgressTracker, SharedProgressTracker,
};

/// All the stores of one persistence
pub struct Stores<P: Persistence> {
    pub accounts: SharedAccountStore<P>,
    pub auctions: SharedAuctionStore<P>,
    pub favorites: SharedFavoriteStore<P>,
    pub listings: SharedListingStore<P>,
    pub notifications: SharedNotificationStore<P>,
    pub reviews: SharedReviewStore<P>,
    pub trades: SharedTradeStore<P>,
    pub progress: SharedProgressTracker<P>,
}

impl<P: Persistence> Clone for Stores<P> {
    fn clone(&self) -> Self {
        Self {
            accounts: self.accounts.clone(),
            auctions: self.auctions.clone(),
            favorites: self.favorites.clone(),
            listings: self.listings.clone(),
            notifications: self.notifications.clone(),
            reviews: self.reviews.clone(),
            trades: self.trades.clone(),
            progress: self.progress.clone(),
        }
    }
}

impl Stores<InMemoryPersistence> {
    pub fn in_memory() -> Self {
        Self {
            accounts: InMemoryAccountStore::new_shared(),
            auctions: InMemoryAuctionStore::new_shared(),
            favorites: InMemoryFavoriteStore::new_shared(),
            listings: InMemoryListingStore::new_shared(),
            notifications: InMemoryNotificationStore::new_shared(),
            reviews: InMemoryReviewStore::new_shared(),
            trades: InMemoryTradeStore::new_shared(),
            progress: InMemoryProgressTracker::new_shared(),
        }
    }
}

impl Stores<PostgresPersistence> {
    pub fn postgres() -> Self {
        Self {
            accounts: PostgresAccountStore::new_shared(),
            auctions: PostgresAuctionStore::new_shared(),
            favorites: PostgresFavoriteStore::new_shared(),
            listings: PostgresListingStore::new_shared(),
            notifications: PostgresNotificationStore::new_shared(),
            reviews: PostgresReviewStore::new_shared(),
            trades: PostgresTradeStore::new_shared(),
            progress: PostgresProgressTracker::new_shared(),
        }
    }
}

/// Newest first, then by id so that the order is total
fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (chrono::DateTime<chrono::Utc>, &str)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

fn page<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    items.into_iter().skip(offset).take(limit).collect()
}
