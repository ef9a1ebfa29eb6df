use super::*;
use crate::persistence::{PostgresPersistence, PostgresTransaction};

pub struct PostgresFavoriteStore;

impl PostgresFavoriteStore {
    pub fn new_shared() -> SharedFavoriteStore<PostgresPersistence> {
        Arc::new(Self)
    }
}

impl FavoriteStore for PostgresFavoriteStore {
    type Persistence = PostgresPersistence;

    fn add_tr<'a>(&self, conn: &mut PostgresTransaction<'a>, favorite: &Favorite) -> Result<bool> {
        let inserted = conn.execute(
            "INSERT INTO favorites (user_id, listing_id, created_at) VALUES ($1, $2, $3)
             ON CONFLICT DO NOTHING",
            &[&favorite.user_id, &favorite.listing_id, &favorite.created_at],
        )?;
        Ok(inserted == 1)
    }

    fn remove_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        user_id: UserIdRef,
        listing_id: ListingIdRef,
    ) -> Result<bool> {
        let removed = conn.execute(
            "DELETE FROM favorites WHERE user_id = $1 AND listing_id = $2",
            &[&user_id, &listing_id],
        )?;
        Ok(removed == 1)
    }

    fn list_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        user_id: UserIdRef,
    ) -> Result<Vec<Favorite>> {
        Ok(conn
            .query(
                "SELECT user_id, listing_id, created_at FROM favorites
                 WHERE user_id = $1 ORDER BY created_at DESC, listing_id DESC",
                &[&user_id],
            )?
            .iter()
            .map(|row| Favorite {
                user_id: row.get("user_id"),
                listing_id: row.get("listing_id"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}
