//! A subscription is a subscriber's enrollment in a stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reference::Reference;

/// At most one row exists per `(subscriber.kind, subscriber.id, stream_id)`
/// (enforced by a UNIQUE constraint in the store). Rejoining resets
/// `joined_at` on the same row; leaving deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
  pub subscription_id: Uuid,
  pub subscriber:      Reference,
  pub stream_id:       Uuid,
  /// Anchor for relative-mode schedules.
  pub joined_at:       DateTime<Utc>,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}
