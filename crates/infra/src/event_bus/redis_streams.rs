//! Redis Streams-backed event bus (durable, at-least-once delivery).
//!
//! - **Stream key**: `ratings` (spec §6).
//! - **Consumer group**: `rating_processor_group` (spec §4.6, §6).
//! - **Durability**: XADD persists until XACK'd; unacked entries are
//!   redeliverable via XCLAIM after they've been pending longer than the
//!   claim's min-idle-time.
//!
//! This module intentionally exposes two things: [`RatingEventBus`], a thin
//! publish handle implementing `ratings_events::EventBus` for C5, and
//! [`RatingStreamConsumer`], a manual-ack reader for C6. A generic
//! fire-and-forget subscribe channel (acked on read) cannot express "don't
//! commit the offset until the batch procedure succeeds" (spec §4.6 "Store
//! error during batch processing: ... do not commit offset, allow
//! re-delivery") — the aggregation worker therefore drives
//! `RatingStreamConsumer` directly, with its own ack call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ratings_content::RatingEvent;
use ratings_events::EventBus;
use tracing::{instrument, warn};

pub const DEFAULT_STREAM_KEY: &str = "ratings";
pub const DEFAULT_CONSUMER_GROUP: &str = "rating_processor_group";

/// Min-idle-time before a pending entry is eligible for reclaim. This is the
/// closest Redis Streams analogue to the Kafka consumer's 30s session
/// timeout (spec §6).
const CLAIM_MIN_IDLE: Duration = Duration::from_millis(30_000);

/// Blocking-read timeout. This is the closest Redis Streams analogue to the
/// Kafka consumer's 10s heartbeat interval (spec §6).
const READ_BLOCK: Duration = Duration::from_millis(10_000);

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("redis connection error: {0}")]
    Connection(String),

    #[error("redis command error: {0}")]
    Command(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone)]
pub struct RatingEventBus {
    client: Arc<redis::Client>,
    stream_key: String,
}

impl RatingEventBus {
    pub fn new(redis_url: impl AsRef<str>, stream_key: Option<String>) -> Result<Self, EventBusError> {
        let client =
            redis::Client::open(redis_url.as_ref()).map_err(|e| EventBusError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            stream_key: stream_key.unwrap_or_else(|| DEFAULT_STREAM_KEY.to_string()),
        })
    }

    /// Ensure a consumer group exists (idempotent; errors from "already
    /// exists" are swallowed).
    pub fn ensure_consumer_group(&self, group_name: &str) -> Result<(), EventBusError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| EventBusError::Connection(e.to_string()))?;

        let _: Result<String, _> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(group_name)
            .arg("0")
            .arg("MKSTREAM")
            .query(&mut conn);

        Ok(())
    }

    #[instrument(skip(self, event), fields(stream_key = %self.stream_key, content_id = %event.content_id), err)]
    fn publish_sync(&self, event: &RatingEvent) -> Result<(), EventBusError> {
        let payload = serde_json::to_string(event).map_err(|e| EventBusError::Serialization(e.to_string()))?;

        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| EventBusError::Connection(e.to_string()))?;

        let _: String = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("*")
            .arg("content_id")
            .arg(event.content_id.0.to_string())
            .arg("payload")
            .arg(&payload)
            .query(&mut conn)
            .map_err(|e| EventBusError::Command(format!("XADD failed: {e}")))?;

        Ok(())
    }

    fn ack_sync(&self, group_name: &str, message_ids: &[String]) -> Result<(), EventBusError> {
        if message_ids.is_empty() {
            return Ok(());
        }

        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| EventBusError::Connection(e.to_string()))?;

        let _: u64 = redis::cmd("XACK")
            .arg(&self.stream_key)
            .arg(group_name)
            .arg(message_ids)
            .query(&mut conn)
            .map_err(|e| EventBusError::Command(format!("XACK failed: {e}")))?;

        Ok(())
    }

    fn read_sync(
        &self,
        group_name: &str,
        consumer_name: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, EventBusError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| EventBusError::Connection(e.to_string()))?;

        let pending = self.read_pending(&mut conn, group_name, consumer_name, count)?;
        if !pending.is_empty() {
            return Ok(pending);
        }

        self.read_new(&mut conn, group_name, consumer_name, count)
    }

    fn read_pending(
        &self,
        conn: &mut redis::Connection,
        group_name: &str,
        consumer_name: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, EventBusError> {
        let pending_info: redis::RedisResult<Vec<(String, String, u64, u64)>> = redis::cmd("XPENDING")
            .arg(&self.stream_key)
            .arg(group_name)
            .arg("-")
            .arg("+")
            .arg(count as i64)
            .arg(consumer_name)
            .query(conn);

        let pending_ids = match pending_info {
            Ok(entries) => entries.into_iter().map(|(id, _, _, _)| id).collect::<Vec<_>>(),
            Err(_) => return Ok(vec![]),
        };

        if pending_ids.is_empty() {
            return Ok(vec![]);
        }

        let claimed: redis::RedisResult<Vec<redis::Value>> = redis::cmd("XCLAIM")
            .arg(&self.stream_key)
            .arg(group_name)
            .arg(consumer_name)
            .arg(CLAIM_MIN_IDLE.as_millis() as u64)
            .arg(&pending_ids)
            .query(conn);

        Ok(claimed
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| self.parse_entry(entry))
            .collect())
    }

    fn read_new(
        &self,
        conn: &mut redis::Connection,
        group_name: &str,
        consumer_name: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, EventBusError> {
        let result: redis::RedisResult<HashMap<String, Vec<redis::Value>>> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group_name)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count as i64)
            .arg("BLOCK")
            .arg(READ_BLOCK.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.stream_key)
            .arg(">")
            .query(conn);

        let stream_data = match result {
            Ok(data) => data,
            Err(e) if e.kind() == redis::ErrorKind::TypeError => return Ok(vec![]),
            Err(e) => return Err(EventBusError::Command(format!("XREADGROUP failed: {e}"))),
        };

        Ok(stream_data
            .get(&self.stream_key)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| self.parse_entry(entry))
            .collect())
    }

    /// Parse one stream entry. A message whose payload fails to deserialize
    /// is still returned (with `event: None`) so the caller can XACK it —
    /// spec §4.6/§7 "Malformed event payload: log and skip (commit offset)".
    fn parse_entry(&self, entry: redis::Value) -> Option<StreamEntry> {
        let entry_vec = match entry {
            redis::Value::Bulk(v) => v,
            _ => return None,
        };
        if entry_vec.len() < 2 {
            return None;
        }

        let message_id = match &entry_vec[0] {
            redis::Value::Data(data) => String::from_utf8_lossy(data).to_string(),
            _ => return None,
        };

        let fields_vec = match &entry_vec[1] {
            redis::Value::Bulk(v) => v.clone(),
            _ => return None,
        };

        let mut fields = HashMap::new();
        for chunk in fields_vec.chunks(2) {
            if let [redis::Value::Data(k), redis::Value::Data(v)] = chunk {
                fields.insert(String::from_utf8_lossy(k).to_string(), String::from_utf8_lossy(v).to_string());
            }
        }

        let event = fields
            .get("payload")
            .and_then(|payload| serde_json::from_str::<RatingEvent>(payload).ok());

        if event.is_none() {
            warn!(message_id = %message_id, "poison event on ratings stream, will be acked and skipped");
        }

        Some(StreamEntry { message_id, event })
    }
}

/// One entry read from the stream. `event` is `None` for a poison payload.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub message_id: String,
    pub event: Option<RatingEvent>,
}

impl EventBus<RatingEvent> for RatingEventBus {
    type Error = EventBusError;

    fn publish(&self, message: RatingEvent) -> Result<(), Self::Error> {
        self.publish_sync(&message)
    }
}

/// Manual-ack consumer used by the aggregation worker (C6).
pub struct RatingStreamConsumer {
    bus: Arc<RatingEventBus>,
    group_name: String,
    consumer_name: String,
}

impl RatingStreamConsumer {
    pub fn new(bus: Arc<RatingEventBus>, group_name: impl Into<String>, consumer_name: impl Into<String>) -> Self {
        Self {
            bus,
            group_name: group_name.into(),
            consumer_name: consumer_name.into(),
        }
    }

    pub fn ensure_group(&self) -> Result<(), EventBusError> {
        self.bus.ensure_consumer_group(&self.group_name)
    }

    /// Read the next batch (pending entries first, then new ones). Blocks up
    /// to `READ_BLOCK` if there is nothing new.
    pub fn poll(&self) -> Result<Vec<StreamEntry>, EventBusError> {
        self.bus.read_sync(&self.group_name, &self.consumer_name, 10)
    }

    pub fn ack(&self, message_ids: &[String]) -> Result<(), EventBusError> {
        self.bus.ack_sync(&self.group_name, message_ids)
    }
}
