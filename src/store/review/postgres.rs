use super::*;
use crate::persistence::{PostgresPersistence, PostgresTransaction};
use ::postgres::Row;

const REVIEW_COLUMNS: &str =
    "id, transaction_id, reviewer_id, reviewee_id, rating, comment, created_at";

pub struct PostgresReviewStore;

impl PostgresReviewStore {
    pub fn new_shared() -> SharedReviewStore<PostgresPersistence> {
        Arc::new(Self)
    }
}

fn review_from_row(row: &Row) -> Result<Review> {
    Ok(Review {
        id: row.get("id"),
        transaction_id: row.get("transaction_id"),
        reviewer_id: row.get("reviewer_id"),
        reviewee_id: row.get("reviewee_id"),
        rating: u8::try_from(row.get::<_, i16>("rating"))?,
        comment: row.get("comment"),
        created_at: row.get("created_at"),
    })
}

impl ReviewStore for PostgresReviewStore {
    type Persistence = PostgresPersistence;

    fn insert_tr<'a>(&self, conn: &mut PostgresTransaction<'a>, review: &Review) -> Result<()> {
        conn.execute(
            &format!("INSERT INTO reviews ({REVIEW_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"),
            &[
                &review.id,
                &review.transaction_id,
                &review.reviewer_id,
                &review.reviewee_id,
                &i16::from(review.rating),
                &review.comment,
                &review.created_at,
            ],
        )?;
        Ok(())
    }

    fn find_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        transaction_id: TransactionIdRef,
        reviewer_id: UserIdRef,
    ) -> Result<Option<Review>> {
        conn.query_opt(
            &format!(
                "SELECT {REVIEW_COLUMNS} FROM reviews
                 WHERE transaction_id = $1 AND reviewer_id = $2"
            ),
            &[&transaction_id, &reviewer_id],
        )?
        .map(|row| review_from_row(&row))
        .transpose()
    }

    fn list_for_reviewee_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        reviewee_id: UserIdRef,
    ) -> Result<Vec<Review>> {
        conn.query(
            &format!(
                "SELECT {REVIEW_COLUMNS} FROM reviews
                 WHERE reviewee_id = $1 ORDER BY created_at DESC, id DESC"
            ),
            &[&reviewee_id],
        )?
        .iter()
        .map(review_from_row)
        .collect()
    }
}
