use crate::error::{MarketError, MarketResult};
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub transaction_id: TransactionId,
    pub reviewer_id: UserId,
    pub reviewee_id: UserId,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub transaction_id: TransactionId,
    pub reviewer_id: UserId,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

impl NewReview {
    pub fn validate(&self) -> MarketResult<()> {
        if !(1..=5).contains(&self.rating) {
            return Err(MarketError::Validation(
                "rating must be between 1 and 5".into(),
            ));
        }
        Ok(())
    }
}

/// Reviews received by a user
#[derive(Debug, Clone, Serialize)]
pub struct ReviewSummary {
    pub user_id: UserId,
    pub count: usize,
    pub average_rating: Option<f64>,
    pub reviews: Vec<Review>,
}

impl ReviewSummary {
    pub fn new(user_id: UserId, reviews: Vec<Review>) -> Self {
        let average_rating = if reviews.is_empty() {
            None
        } else {
            let total: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
            Some(f64::from(total) / reviews.len() as f64)
        };
        Self {
            user_id,
            count: reviews.len(),
            average_rating,
            reviews,
        }
    }
}
