use chrono::{DateTime, Utc};
use ratings_core::UserId;
use serde::{Deserialize, Serialize};

use crate::content::ContentId;

/// Published to the event stream by C5 after a successful commit (spec §3,
/// §6 "Event stream"). Partition key is `content_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingEvent {
    pub content_id: ContentId,
    pub rating_id: i64,
    pub user_id: UserId,
    pub rating_value: i32,
    pub submitted_at: DateTime<Utc>,
}

impl RatingEvent {
    pub fn partition_key(&self) -> String {
        self.content_id.to_string()
    }
}

impl ratings_events::Event for RatingEvent {
    fn event_type(&self) -> &'static str {
        "rating.submitted"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}
