//! The resolved, client-facing state of one event.
//!
//! Never stored, always derived: the resolver builds an [`EventState`] on
//! every call and the caller decides how long to keep it (see
//! [`crate::manager::EnrollmentManager::get_cache_key`]).

use std::{fmt, sync::Arc};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use uuid::Uuid;

use crate::{
  content::{ContentSource, Payload},
  reference::Reference,
};

/// What a client may see of an event.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccessState {
  /// Not shown at all.
  Hidden,
  /// Shown with its teaser; opens at `unlocks_at`.
  Locked,
  /// Fully accessible.
  Opened,
}

impl AccessState {
  pub fn is_hidden(self) -> bool { matches!(self, Self::Hidden) }

  pub fn is_locked(self) -> bool { matches!(self, Self::Locked) }

  pub fn is_opened(self) -> bool { matches!(self, Self::Opened) }
}

// ─── EventState ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct EventState {
  pub event_id:    Uuid,
  pub content:     Reference,
  pub source:      Arc<dyn ContentSource>,
  pub state:       AccessState,
  /// For `Locked` the instant the event opens. `Hidden` and `Opened` carry a
  /// far-future placeholder; `state` is authoritative for those.
  pub unlocks_at:  Option<DateTime<Utc>>,
  /// The clock reading the state was computed against.
  pub resolved_at: DateTime<Utc>,
}

impl fmt::Debug for EventState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EventState")
      .field("event_id", &self.event_id)
      .field("content", &self.content)
      .field("state", &self.state)
      .field("unlocks_at", &self.unlocks_at)
      .field("resolved_at", &self.resolved_at)
      .finish_non_exhaustive()
  }
}

impl EventState {
  /// Hidden → nothing, Locked → teaser, Opened → full content.
  pub fn payload(&self) -> Payload {
    match self.state {
      AccessState::Hidden => Payload::new(),
      AccessState::Locked => self.source.teaser_payload(),
      AccessState::Opened => self.source.full_payload(),
    }
  }

  /// Human-readable time until a locked event opens, relative to when the
  /// state was resolved.
  pub fn time_remaining(&self) -> Option<String> {
    self.time_remaining_at(self.resolved_at)
  }

  pub fn time_remaining_at(&self, now: DateTime<Utc>) -> Option<String> {
    if !self.state.is_locked() {
      return None;
    }
    self.unlocks_at.map(|at| relative_time(at, now))
  }

  /// The fixed wire shape handed to clients.
  pub fn to_view(&self) -> EventStateView {
    EventStateView {
      state:          self.state,
      is_hidden:      self.state.is_hidden(),
      is_locked:      self.state.is_locked(),
      is_opened:      self.state.is_opened(),
      unlocks_at:     self
        .unlocks_at
        .filter(|_| self.state.is_locked())
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
      time_remaining: self.time_remaining(),
      payload:        self.payload(),
    }
  }
}

impl Serialize for EventState {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.to_view().serialize(serializer)
  }
}

/// Serialised form of an [`EventState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventStateView {
  pub state:          AccessState,
  pub is_hidden:      bool,
  pub is_locked:      bool,
  pub is_opened:      bool,
  /// RFC 3339 UTC; `null` unless locked.
  pub unlocks_at:     Option<String>,
  pub time_remaining: Option<String>,
  pub payload:        Payload,
}

// ─── Relative time ───────────────────────────────────────────────────────────

const UNITS: [(i64, &str); 7] = [
  (365 * 86_400, "year"),
  (30 * 86_400, "month"),
  (7 * 86_400, "week"),
  (86_400, "day"),
  (3_600, "hour"),
  (60, "minute"),
  (1, "second"),
];

/// `"3 days from now"`, `"1 hour ago"`. Uses the largest whole unit.
pub fn relative_time(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let delta = target - now;
  let future = delta > chrono::Duration::zero();
  let mut secs = delta.num_seconds().abs();
  if future && secs == 0 {
    // Less than a second ahead still reads as a second.
    secs = 1;
  }

  let (count, unit) = UNITS
    .iter()
    .find(|(len, _)| secs >= *len)
    .map(|(len, unit)| (secs / len, *unit))
    .unwrap_or((0, "second"));
  let plural = if count == 1 { "" } else { "s" };

  if future {
    format!("{count} {unit}{plural} from now")
  } else {
    format!("{count} {unit}{plural} ago")
  }
}
