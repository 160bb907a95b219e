//! The `DripStore` trait.
//!
//! Implemented by storage backends (`dripflow-store-sqlite`, and the
//! in-memory [`crate::memory::MemoryStore`]). The enrollment manager depends
//! on this abstraction, never on a concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  event::{Event, EventUpdate, NewEvent},
  reference::Reference,
  stream::{NewStream, Stream, StreamUpdate},
  subscription::Subscription,
};

/// Abstraction over a Dripflow storage backend.
///
/// Backends own id and timestamp assignment for streams and events. The
/// subscription writes take `joined_at` from the caller so the manager's
/// injected clock stays the only source of "now" for schedules.
///
/// `Error` must absorb [`crate::Error`] so generic callers can mix
/// resolution failures and storage failures behind one `?`.
pub trait DripStore: Send + Sync {
  type Error: std::error::Error + From<crate::Error> + Send + Sync + 'static;

  // ── Streams ───────────────────────────────────────────────────────────

  /// Persist a new stream. Fails with a validation error if it is in fixed
  /// mode without a `start_date`.
  fn create_stream(
    &self,
    input: NewStream,
  ) -> impl Future<Output = Result<Stream, Self::Error>> + Send + '_;

  /// Apply `update` and bump `updated_at`. Same validation as create.
  fn update_stream(
    &self,
    stream_id: Uuid,
    update: StreamUpdate,
  ) -> impl Future<Output = Result<Stream, Self::Error>> + Send + '_;

  fn get_stream(
    &self,
    stream_id: Uuid,
  ) -> impl Future<Output = Result<Option<Stream>, Self::Error>> + Send + '_;

  /// The first stream created for `origin`, if any.
  fn get_stream_by_origin<'a>(
    &'a self,
    origin: &'a Reference,
  ) -> impl Future<Output = Result<Option<Stream>, Self::Error>> + Send + 'a;

  /// Delete a stream together with its events and subscriptions. Returns
  /// whether a stream was deleted.
  fn delete_stream(
    &self,
    stream_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Events ────────────────────────────────────────────────────────────

  /// Persist a new event. `offset_interval` is stored as given; it is
  /// validated when resolved, not here.
  fn add_event(
    &self,
    input: NewEvent,
  ) -> impl Future<Output = Result<Event, Self::Error>> + Send + '_;

  fn update_event(
    &self,
    event_id: Uuid,
    update: EventUpdate,
  ) -> impl Future<Output = Result<Event, Self::Error>> + Send + '_;

  fn get_event(
    &self,
    event_id: Uuid,
  ) -> impl Future<Output = Result<Option<Event>, Self::Error>> + Send + '_;

  /// Visible events of a stream in insertion order.
  fn list_visible_events(
    &self,
    stream_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + '_;

  // ── Subscriptions ─────────────────────────────────────────────────────

  fn find_subscription<'a>(
    &'a self,
    subscriber: &'a Reference,
    stream_id: Uuid,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send + 'a;

  /// Insert a subscription unless one exists for the triple; return whichever
  /// row is stored afterwards. Must be a single atomic step so that two
  /// concurrent calls end up with the same row.
  fn insert_subscription_if_absent<'a>(
    &'a self,
    subscriber: &'a Reference,
    stream_id: Uuid,
    joined_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Subscription, Self::Error>> + Send + 'a;

  /// Insert, or reset `joined_at` on the existing row (keeping its id).
  fn upsert_subscription<'a>(
    &'a self,
    subscriber: &'a Reference,
    stream_id: Uuid,
    joined_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Subscription, Self::Error>> + Send + 'a;

  /// Delete the matching row; returns the number of rows removed.
  fn delete_subscription<'a>(
    &'a self,
    subscriber: &'a Reference,
    stream_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// All subscriptions held by `subscriber`, oldest first.
  fn list_subscriptions<'a>(
    &'a self,
    subscriber: &'a Reference,
  ) -> impl Future<Output = Result<Vec<Subscription>, Self::Error>> + Send + 'a;
}
