use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content identifier (monotonic integer, per spec §3).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub i64);

impl core::fmt::Display for ContentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Occurrence count per integer rating value (0..=5).
pub type RatingDistribution = BTreeMap<i32, i64>;

/// A rated content item, with the denormalized aggregate fields C6 maintains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: ContentId,
    pub title: String,
    pub text: String,
    pub created_at: DateTime<Utc>,

    pub rating_count: i64,
    pub average_rating: f64,
    pub rating_distribution: RatingDistribution,
}

impl Content {
    pub fn new(id: ContentId, title: impl Into<String>, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            text: text.into(),
            created_at,
            rating_count: 0,
            average_rating: 0.0,
            rating_distribution: RatingDistribution::new(),
        }
    }

    /// Recompute the denormalized aggregate from a full set of ratings for
    /// this content (spec §4.6 step 4 / I3, I4).
    ///
    /// Always a full recompute over every row, never an incremental delta —
    /// this is what makes the worker's batch procedure idempotent under
    /// redelivery (spec §4.6 "Idempotence").
    pub fn recompute_aggregate<'a>(&mut self, ratings: impl IntoIterator<Item = &'a (i32, f64)>) {
        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;
        let mut count = 0i64;
        let mut distribution = RatingDistribution::new();

        for &(value, weight) in ratings {
            weighted_sum += value as f64 * weight;
            weight_sum += weight;
            count += 1;
            *distribution.entry(value).or_insert(0) += 1;
        }

        self.rating_count = count;
        self.average_rating = if weight_sum > 0.0 { weighted_sum / weight_sum } else { 0.0 };
        self.rating_distribution = distribution;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> Content {
        Content::new(ContentId(1), "title", "text", Utc::now())
    }

    #[test]
    fn recompute_with_no_ratings_is_zeroed() {
        let mut c = content();
        c.recompute_aggregate(&[]);
        assert_eq!(c.rating_count, 0);
        assert_eq!(c.average_rating, 0.0);
        assert!(c.rating_distribution.is_empty());
    }

    #[test]
    fn recompute_is_weighted_not_arithmetic_mean() {
        let mut c = content();
        // one full-weight 5, one near-zero-weight 0 -- should stay close to 5.
        c.recompute_aggregate(&[(5, 1.0), (0, 0.001)]);
        assert_eq!(c.rating_count, 2);
        assert!((c.average_rating - (5.0 * 1.0 / 1.001)).abs() < 1e-9);
    }

    #[test]
    fn recompute_builds_distribution() {
        let mut c = content();
        c.recompute_aggregate(&[(4, 1.0), (4, 1.0), (2, 1.0)]);
        assert_eq!(c.rating_distribution.get(&4), Some(&2));
        assert_eq!(c.rating_distribution.get(&2), Some(&1));
    }
}
