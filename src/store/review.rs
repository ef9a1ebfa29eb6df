mod postgres;

pub use self::postgres::*;

use super::newest_first;
use crate::persistence::{
    InMemoryPersistence, InMemoryTable, InMemoryTransaction, Persistence, TransactionOf,
};
use crate::review::Review;
use crate::types::*;
use anyhow::Result;
use std::sync::Arc;

pub trait ReviewStore {
    type Persistence: Persistence;

    fn insert_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        review: &Review,
    ) -> Result<()>;

    fn find_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        transaction_id: TransactionIdRef,
        reviewer_id: UserIdRef,
    ) -> Result<Option<Review>>;

    /// Reviews received by a user, newest first
    fn list_for_reviewee_tr<'a>(
        &self,
        conn: &mut TransactionOf<'a, Self::Persistence>,
        reviewee_id: UserIdRef,
    ) -> Result<Vec<Review>>;
}

pub type SharedReviewStore<P> = Arc<dyn ReviewStore<Persistence = P> + Send + Sync>;

#[derive(Default)]
pub struct InMemoryReviewStore {
    reviews: InMemoryTable<(TransactionId, UserId), Review>,
}

impl InMemoryReviewStore {
    pub fn new_shared() -> SharedReviewStore<InMemoryPersistence> {
        Arc::new(Self::default())
    }
}

impl ReviewStore for InMemoryReviewStore {
    type Persistence = InMemoryPersistence;

    fn insert_tr<'a>(&self, conn: &mut InMemoryTransaction<'a>, review: &Review) -> Result<()> {
        self.reviews.insert(
            conn,
            (review.transaction_id.clone(), review.reviewer_id.clone()),
            review.clone(),
        );
        Ok(())
    }

    fn find_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        transaction_id: TransactionIdRef,
        reviewer_id: UserIdRef,
    ) -> Result<Option<Review>> {
        Ok(self
            .reviews
            .get(&(transaction_id.to_owned(), reviewer_id.to_owned())))
    }

    fn list_for_reviewee_tr<'a>(
        &self,
        _conn: &mut InMemoryTransaction<'a>,
        reviewee_id: UserIdRef,
    ) -> Result<Vec<Review>> {
        let mut reviews = self.reviews.filter(|r| r.reviewee_id == reviewee_id);
        newest_first(&mut reviews, |r| (r.created_at, r.id.as_str()));
        Ok(reviews)
    }
}
