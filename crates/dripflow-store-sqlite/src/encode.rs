//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. UUIDs are stored as
//! hyphenated lowercase strings. Polymorphic references are split into a
//! `*_type` text column and a `*_id` integer column.

use chrono::{DateTime, Utc};
use dripflow_core::{
  event::Event,
  reference::Reference,
  stream::{Stream, UnlockMode},
  subscription::Subscription,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── UnlockMode ──────────────────────────────────────────────────────────────

pub fn encode_unlock_mode(mode: UnlockMode) -> &'static str {
  match mode {
    UnlockMode::Fixed => "fixed",
    UnlockMode::Relative => "relative",
  }
}

pub fn decode_unlock_mode(s: &str) -> Result<UnlockMode> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown unlock mode: {s:?}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawStream::from_row`].
pub const STREAM_COLUMNS: &str = "stream_id, origin_type, origin_id, is_public, \
                                  unlock_mode, start_date, is_active, \
                                  created_at, updated_at";

/// Raw values read directly from a `drip_streams` row.
pub struct RawStream {
  pub stream_id:   String,
  pub origin_type: String,
  pub origin_id:   i64,
  pub is_public:   bool,
  pub unlock_mode: String,
  pub start_date:  Option<String>,
  pub is_active:   bool,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawStream {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      stream_id:   row.get(0)?,
      origin_type: row.get(1)?,
      origin_id:   row.get(2)?,
      is_public:   row.get(3)?,
      unlock_mode: row.get(4)?,
      start_date:  row.get(5)?,
      is_active:   row.get(6)?,
      created_at:  row.get(7)?,
      updated_at:  row.get(8)?,
    })
  }

  pub fn into_stream(self) -> Result<Stream> {
    Ok(Stream {
      stream_id:   decode_uuid(&self.stream_id)?,
      origin:      Reference::new(self.origin_type, self.origin_id),
      is_public:   self.is_public,
      unlock_mode: decode_unlock_mode(&self.unlock_mode)?,
      start_date:  self.start_date.as_deref().map(decode_dt).transpose()?,
      is_active:   self.is_active,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

/// Column list matching [`RawEvent::from_row`].
pub const EVENT_COLUMNS: &str = "event_id, stream_id, eventable_type, \
                                 eventable_id, offset_interval, is_visible, \
                                 created_at, updated_at";

/// Raw values read directly from a `drip_events` row.
pub struct RawEvent {
  pub event_id:        String,
  pub stream_id:       String,
  pub eventable_type:  String,
  pub eventable_id:    i64,
  pub offset_interval: String,
  pub is_visible:      bool,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:        row.get(0)?,
      stream_id:       row.get(1)?,
      eventable_type:  row.get(2)?,
      eventable_id:    row.get(3)?,
      offset_interval: row.get(4)?,
      is_visible:      row.get(5)?,
      created_at:      row.get(6)?,
      updated_at:      row.get(7)?,
    })
  }

  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      event_id:        decode_uuid(&self.event_id)?,
      stream_id:       decode_uuid(&self.stream_id)?,
      content:         Reference::new(self.eventable_type, self.eventable_id),
      offset_interval: self.offset_interval,
      is_visible:      self.is_visible,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

/// Column list matching [`RawSubscription::from_row`].
pub const SUBSCRIPTION_COLUMNS: &str = "subscription_id, subscriber_type, \
                                        subscriber_id, stream_id, joined_at, \
                                        created_at, updated_at";

/// Raw values read directly from a `drip_subscriptions` row.
pub struct RawSubscription {
  pub subscription_id: String,
  pub subscriber_type: String,
  pub subscriber_id:   i64,
  pub stream_id:       String,
  pub joined_at:       String,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawSubscription {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subscription_id: row.get(0)?,
      subscriber_type: row.get(1)?,
      subscriber_id:   row.get(2)?,
      stream_id:       row.get(3)?,
      joined_at:       row.get(4)?,
      created_at:      row.get(5)?,
      updated_at:      row.get(6)?,
    })
  }

  pub fn into_subscription(self) -> Result<Subscription> {
    Ok(Subscription {
      subscription_id: decode_uuid(&self.subscription_id)?,
      subscriber:      Reference::new(self.subscriber_type, self.subscriber_id),
      stream_id:       decode_uuid(&self.stream_id)?,
      joined_at:       decode_dt(&self.joined_at)?,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}
