use chrono::{DateTime, Utc};
use ratings_core::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::ContentId;

/// A validated integer rating in `[0, 5]` (spec §3 I1).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RatingValue(i32);

impl RatingValue {
    pub fn new(value: i32) -> Result<Self, RatingError> {
        if !(0..=5).contains(&value) {
            return Err(RatingError::OutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> i32 {
        self.0
    }
}

impl TryFrom<i32> for RatingValue {
    type Error = RatingError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RatingError {
    #[error("rating must be an integer in [0, 5], got {0}")]
    OutOfRange(i32),
}

/// Durable per-`(content_id, user_id)` rating record (spec §3).
///
/// `id` is a surrogate row key used only to correlate a row with the
/// `rating_id` carried on a published [`crate::event::RatingEvent`] — the
/// uniqueness constraint that actually defines identity is
/// `(content_id, user_id)` (I5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRow {
    pub id: i64,
    pub content_id: ContentId,
    pub user_id: UserId,
    pub rating: RatingValue,
    /// Weight applied when aggregating, in `(0, 1]` (I2).
    pub weight: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed: bool,
}

impl RatingRow {
    /// Apply a re-submission (spec §4.5 upsert semantics). Always flips
    /// `processed` back to `false` regardless of its prior state (I6).
    pub fn update(&mut self, rating: RatingValue, weight: f64, now: DateTime<Utc>) {
        self.rating = rating;
        self.weight = weight;
        self.processed = false;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_values() {
        assert!(RatingValue::new(6).is_err());
        assert!(RatingValue::new(-1).is_err());
    }

    #[test]
    fn accepts_boundary_values() {
        assert!(RatingValue::new(0).is_ok());
        assert!(RatingValue::new(5).is_ok());
    }

    #[test]
    fn update_resets_processed_flag() {
        let mut row = RatingRow {
            id: 1,
            content_id: ContentId(1),
            user_id: UserId::new(),
            rating: RatingValue::new(4).unwrap(),
            weight: 1.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            processed: true,
        };
        let now = Utc::now();
        row.update(RatingValue::new(2).unwrap(), 1.0, now);
        assert_eq!(row.rating.get(), 2);
        assert!(!row.processed);
        assert_eq!(row.updated_at, now);
    }
}
