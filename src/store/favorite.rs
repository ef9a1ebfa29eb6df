mod postgres;

pub use self::postgres::*;

use super::newest_first;
use crate::listing::Favorite;
use crate::persistence::{
    InMemoryPersistence, InMemoryTable, InMemoryTransaction, Persistence, TransactionOf,
};
use crate::types::*;
use anyhow::Result;
use std::sync::Arc;

pub trait FavoriteStore {
    type Persistence: Persistence;

    /// Returns `false` if the listing already was a favorite
    fn add_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        favorite: &Favorite,
    ) -> Result<bool>;

    /// Returns `false` if there was nothing to remove
    fn remove_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        user_id: UserIdRef,
        listing_id: ListingIdRef,
    ) -> Result<bool>;

    fn list_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        user_id: UserIdRef,
    ) -> Result<Vec<Favorite>>;
}

pub type SharedFavoriteStore<P> = Arc<dyn FavoriteStore<Persistence = P> + Send + Sync>;

#[derive(Default)]
pub struct InMemoryFavoriteStore {
    favorites: InMemoryTable<(UserId, ListingId), Favorite>,
}

impl InMemoryFavoriteStore {
    pub fn new_shared() -> SharedFavoriteStore<InMemoryPersistence> {
        Arc::new(Self::default())
    }
}

impl FavoriteStore for InMemoryFavoriteStore {
    type Persistence = InMemoryPersistence;

    fn add_tr<'a>(&self, conn: &mut InMemoryTransaction<'a>, favorite: &Favorite) -> Result<bool> {
        let key = (favorite.user_id.clone(), favorite.listing_id.clone());
        if self.favorites.get(&key).is_some() {
            return Ok(false);
        }
        self.favorites.insert(conn, key, favorite.clone());
        Ok(true)
    }

    fn remove_tr<'a>(
        &self,
        conn: &mut InMemoryTransaction<'a>,
        user_id: UserIdRef,
        listing_id: ListingIdRef,
    ) -> Result<bool> {
        Ok(self
            .favorites
            .remove(conn, &(user_id.to_owned(), listing_id.to_owned()))
            .is_some())
    }

    fn list_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        user_id: UserIdRef,
    ) -> Result<Vec<Favorite>> {
        let mut favorites = self.favorites.filter(|f| f.user_id == user_id);
        newest_first(&mut favorites, |f| (f.created_at, f.listing_id.as_str()));
        Ok(favorites)
    }
}
