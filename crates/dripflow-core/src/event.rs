//! An event is one content item scheduled within a stream.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, offset::parse_offset, reference::Reference};

/// A persisted event.
///
/// `offset_interval` is kept exactly as written; it is only parsed when the
/// event is resolved, so one bad row fails its own resolution and nothing
/// else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
  pub event_id:        Uuid,
  pub stream_id:       Uuid,
  /// The host content item (a lesson, a video, ...).
  pub content:         Reference,
  /// Integer seconds or an ISO 8601 duration, e.g. `"86400"` or `"P1D"`.
  pub offset_interval: String,
  /// Invisible events are skipped when listing a stream.
  pub is_visible:      bool,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

impl Event {
  /// The parsed offset from the stream's anchor instant.
  pub fn offset(&self) -> Result<Duration> { parse_offset(&self.offset_interval) }
}

/// Input to [`crate::store::DripStore::add_event`].
#[derive(Debug, Clone)]
pub struct NewEvent {
  pub stream_id:       Uuid,
  pub content:         Reference,
  pub offset_interval: String,
  pub is_visible:      bool,
}

impl NewEvent {
  /// A visible event that opens as soon as its anchor does.
  pub fn new(stream_id: Uuid, content: Reference) -> Self {
    Self {
      stream_id,
      content,
      offset_interval: "0".into(),
      is_visible: true,
    }
  }

  pub fn with_offset(mut self, offset_interval: impl Into<String>) -> Self {
    self.offset_interval = offset_interval.into();
    self
  }

  pub fn hidden(mut self) -> Self {
    self.is_visible = false;
    self
  }
}

/// A partial update for [`crate::store::DripStore::update_event`].
#[derive(Debug, Clone, Default)]
pub struct EventUpdate {
  pub offset_interval: Option<String>,
  pub is_visible:      Option<bool>,
}

impl EventUpdate {
  pub fn apply(&self, event: &Event, now: DateTime<Utc>) -> Event {
    let mut next = event.clone();
    if let Some(v) = &self.offset_interval {
      next.offset_interval = v.clone();
    }
    if let Some(v) = self.is_visible {
      next.is_visible = v;
    }
    next.updated_at = now;
    next
  }
}
