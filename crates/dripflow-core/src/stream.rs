//! A stream is the configuration of one content container.
//!
//! A stream decides how its events unlock: either on the calendar (`fixed`,
//! anchored at `start_date`) or per subscriber (`relative`, anchored at each
//! subscription's `joined_at`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, reference::Reference};

/// How a stream computes unlock instants for its events.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UnlockMode {
  /// Calendar-anchored: `start_date + offset` for everybody.
  Fixed,
  /// Enrollment-anchored: `joined_at + offset` per subscriber.
  #[default]
  Relative,
}

/// A persisted stream. Read-only to the resolution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
  pub stream_id:   Uuid,
  /// The host entity the stream belongs to (a course, a marathon, ...).
  pub origin:      Reference,
  /// Public streams release content without an enrollment.
  pub is_public:   bool,
  pub unlock_mode: UnlockMode,
  /// Required when `unlock_mode` is [`UnlockMode::Fixed`].
  pub start_date:  Option<DateTime<Utc>>,
  pub is_active:   bool,
  pub created_at:  DateTime<Utc>,
  /// Bumped on every update; part of the cache key.
  pub updated_at:  DateTime<Utc>,
}

impl Stream {
  pub fn is_fixed_mode(&self) -> bool { self.unlock_mode == UnlockMode::Fixed }

  pub fn is_relative_mode(&self) -> bool {
    self.unlock_mode == UnlockMode::Relative
  }
}

/// Reject the one invalid stream shape: fixed mode with nothing to anchor on.
pub fn validate_unlock_config(
  mode: UnlockMode,
  start_date: Option<DateTime<Utc>>,
) -> Result<()> {
  if mode == UnlockMode::Fixed && start_date.is_none() {
    return Err(Error::Validation(
      "start_date is required when unlock_mode is \"fixed\"".into(),
    ));
  }
  Ok(())
}

// ─── NewStream ───────────────────────────────────────────────────────────────

/// Input to [`crate::store::DripStore::create_stream`]. Timestamps and the id
/// are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewStream {
  pub origin:      Reference,
  pub is_public:   bool,
  pub unlock_mode: UnlockMode,
  pub start_date:  Option<DateTime<Utc>>,
  pub is_active:   bool,
}

impl NewStream {
  /// A public, active, relative-mode stream, matching the table defaults.
  pub fn new(origin: Reference) -> Self {
    Self {
      origin,
      is_public: true,
      unlock_mode: UnlockMode::Relative,
      start_date: None,
      is_active: true,
    }
  }

  /// A fixed-mode stream anchored at `start_date`.
  pub fn fixed(origin: Reference, start_date: DateTime<Utc>) -> Self {
    Self {
      unlock_mode: UnlockMode::Fixed,
      start_date: Some(start_date),
      ..Self::new(origin)
    }
  }

  pub fn private(mut self) -> Self {
    self.is_public = false;
    self
  }

  pub fn inactive(mut self) -> Self {
    self.is_active = false;
    self
  }

  pub fn validate(&self) -> Result<()> {
    validate_unlock_config(self.unlock_mode, self.start_date)
  }
}

// ─── StreamUpdate ────────────────────────────────────────────────────────────

/// A partial update. `None` leaves the field untouched; `start_date` uses a
/// nested option so it can be cleared.
#[derive(Debug, Clone, Default)]
pub struct StreamUpdate {
  pub is_public:   Option<bool>,
  pub unlock_mode: Option<UnlockMode>,
  pub start_date:  Option<Option<DateTime<Utc>>>,
  pub is_active:   Option<bool>,
}

impl StreamUpdate {
  /// Apply to `stream`, validate the result and stamp `updated_at`.
  pub fn apply(&self, stream: &Stream, now: DateTime<Utc>) -> Result<Stream> {
    let mut next = stream.clone();
    if let Some(v) = self.is_public {
      next.is_public = v;
    }
    if let Some(v) = self.unlock_mode {
      next.unlock_mode = v;
    }
    if let Some(v) = self.start_date {
      next.start_date = v;
    }
    if let Some(v) = self.is_active {
      next.is_active = v;
    }
    validate_unlock_config(next.unlock_mode, next.start_date)?;
    next.updated_at = now;
    Ok(next)
  }
}
