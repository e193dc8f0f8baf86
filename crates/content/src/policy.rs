//! Pure scoring rules: admission-time rate limiting and worker-time anomaly
//! detection (spec §4.5, §4.6 step 3).

use serde::{Deserialize, Serialize};

/// Synchronous, admission-time defense (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdmissionPolicy {
    /// `L` — hourly rate-limit constant.
    pub rate_limit_per_hour: i64,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            rate_limit_per_hour: 10_000,
        }
    }
}

impl AdmissionPolicy {
    /// `w = max(1, L - n) / L`, where `n` is the count of same-`content_id`,
    /// same-`rating_value` rows created within the trailing 60 minutes.
    ///
    /// Monotonically decreasing in `n`; floors at `1/L`, never zero (I2).
    pub fn admission_weight(&self, same_value_recent: i64) -> f64 {
        let l = self.rate_limit_per_hour.max(1);
        let headroom = (l - same_value_recent).max(1);
        headroom as f64 / l as f64
    }
}

/// Worker-time anomaly defense (spec §4.6 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyPolicy {
    /// Minimum sample size before the anomaly check fires.
    pub min_rate_count: i64,
    /// Same-value share (0,1) that triggers the penalty.
    pub anomaly_threshold: f64,
    /// Weight applied to rows caught by the anomaly check.
    pub anomaly_weight_penalty: f64,
}

impl Default for AnomalyPolicy {
    fn default() -> Self {
        Self {
            min_rate_count: 10,
            anomaly_threshold: 0.8,
            anomaly_weight_penalty: 0.001,
        }
    }
}

impl AnomalyPolicy {
    /// Whether the last-hour window for a content/rating-value pair looks
    /// like coordinated rate-bombing.
    pub fn is_anomalous(&self, total_recent: i64, same_value_recent: i64) -> bool {
        if total_recent < self.min_rate_count {
            return false;
        }
        let share = same_value_recent as f64 / total_recent as f64;
        share > self.anomaly_threshold
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// P4 / I2: the admission weight always lands in `(0, 1]`, for any
        /// observed `n`, including values far beyond `L`.
        #[test]
        fn admission_weight_stays_in_unit_interval(n in 0i64..1_000_000) {
            let policy = AdmissionPolicy::default();
            let w = policy.admission_weight(n);
            prop_assert!(w > 0.0);
            prop_assert!(w <= 1.0);
        }

        /// Spec §4.5: "monotonically decreasing as identical-value
        /// submissions pile up".
        #[test]
        fn admission_weight_is_monotonically_decreasing(n1 in 0i64..50_000, n2 in 0i64..50_000) {
            let policy = AdmissionPolicy::default();
            if n1 <= n2 {
                prop_assert!(policy.admission_weight(n1) >= policy.admission_weight(n2));
            }
        }

        /// I1: only integers in `[0, 5]` round-trip through `RatingValue`.
        #[test]
        fn rating_value_accepts_only_the_closed_range(v in -100i32..100) {
            let result = crate::rating::RatingValue::new(v);
            prop_assert_eq!(result.is_ok(), (0..=5).contains(&v));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_weight_is_one_with_no_recent_submissions() {
        let policy = AdmissionPolicy::default();
        assert_eq!(policy.admission_weight(0), 1.0);
    }

    #[test]
    fn admission_weight_degrades_as_n_grows() {
        let policy = AdmissionPolicy::default();
        assert!((policy.admission_weight(9_000) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn admission_weight_floors_at_one_over_l() {
        let policy = AdmissionPolicy::default();
        assert_eq!(policy.admission_weight(9_999), 1.0 / 10_000.0);
        // Beyond L it still floors rather than going to zero or negative.
        assert_eq!(policy.admission_weight(50_000), 1.0 / 10_000.0);
    }

    #[test]
    fn anomaly_requires_minimum_sample() {
        let policy = AnomalyPolicy::default();
        assert!(!policy.is_anomalous(5, 5));
    }

    #[test]
    fn anomaly_fires_above_threshold() {
        let policy = AnomalyPolicy::default();
        assert!(policy.is_anomalous(12, 12));
        assert!(!policy.is_anomalous(12, 9));
    }
}
