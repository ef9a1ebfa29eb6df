use super::*;
use crate::listing::ListingDetails;
use crate::persistence::postgres::{from_db_amount, to_db_amount};
use crate::persistence::{PostgresPersistence, PostgresTransaction};
use ::postgres::{types::Json, Row};

const LISTING_COLUMNS: &str =
    "id, seller_id, title, description, location, price, details, status, created_at";

pub struct PostgresListingStore;

impl PostgresListingStore {
    pub fn new_shared() -> SharedListingStore<PostgresPersistence> {
        Arc::new(Self)
    }
}

fn listing_from_row(row: &Row) -> Result<Listing> {
    let Json(details) = row.get::<_, Json<ListingDetails>>("details");
    Ok(Listing {
        id: row.get("id"),
        seller_id: row.get("seller_id"),
        title: row.get("title"),
        description: row.get("description"),
        location: row.get("location"),
        price: row
            .get::<_, Option<i64>>("price")
            .map(from_db_amount)
            .transpose()?,
        details,
        status: row.get::<_, &str>("status").parse()?,
        created_at: row.get("created_at"),
    })
}

impl ListingStore for PostgresListingStore {
    type Persistence = PostgresPersistence;

    fn insert_tr<'a>(&self, conn: &mut PostgresTransaction<'a>, listing: &Listing) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO listings ({LISTING_COLUMNS})
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
            ),
            &[
                &listing.id,
                &listing.seller_id,
                &listing.title,
                &listing.description,
                &listing.location,
                &listing.price.map(to_db_amount).transpose()?,
                &Json(&listing.details),
                &listing.status.as_str(),
                &listing.created_at,
            ],
        )?;
        Ok(())
    }

    fn load_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        id: ListingIdRef,
    ) -> Result<Option<Listing>> {
        conn.query_opt(
            &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1"),
            &[&id],
        )?
        .map(|row| listing_from_row(&row))
        .transpose()
    }

    fn lock_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        id: ListingIdRef,
    ) -> Result<Option<Listing>> {
        conn.query_opt(
            &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1 FOR NO KEY UPDATE"),
            &[&id],
        )?
        .map(|row| listing_from_row(&row))
        .transpose()
    }

    fn update_tr<'a>(&self, conn: &mut PostgresTransaction<'a>, listing: &Listing) -> Result<()> {
        conn.execute(
            "UPDATE listings SET title = $2, description = $3, location = $4, price = $5,
                 details = $6, status = $7
             WHERE id = $1",
            &[
                &listing.id,
                &listing.title,
                &listing.description,
                &listing.location,
                &listing.price.map(to_db_amount).transpose()?,
                &Json(&listing.details),
                &listing.status.as_str(),
            ],
        )?;
        Ok(())
    }

    fn list_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        filter: &ListingFilter,
    ) -> Result<Vec<Listing>> {
        conn.query(
            &format!(
                "SELECT {LISTING_COLUMNS} FROM listings
                 WHERE ($1::TEXT IS NULL OR details->>'kind' = $1)
                   AND ($2::TEXT IS NULL OR status = $2)
                   AND ($3::TEXT IS NULL OR seller_id = $3)
                   AND ($4::TEXT IS NULL OR lower(details->>'brand') = lower($4))
                   AND ($5::BIGINT IS NULL OR price >= $5)
                   AND ($6::BIGINT IS NULL OR price <= $6)
                 ORDER BY created_at DESC, id DESC
                 OFFSET $7 LIMIT $8"
            ),
            &[
                &filter.kind.map(|k| k.as_str()),
                &filter.status.map(|s| s.as_str()),
                &filter.seller_id,
                &filter.brand,
                &filter.min_price.map(to_db_amount).transpose()?,
                &filter.max_price.map(to_db_amount).transpose()?,
                &i64::try_from(filter.offset)?,
                &i64::try_from(filter.page_size())?,
            ],
        )?
        .iter()
        .map(listing_from_row)
        .collect()
    }
}
