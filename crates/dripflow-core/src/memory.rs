//! In-memory implementation of [`DripStore`].
//!
//! Same semantics as the SQLite backend (uniqueness of the subscription
//! triple, cascade deletes, insertion-ordered event listing) with no
//! persistence. Every operation takes the lock once, which makes
//! insert-if-absent and upsert atomic.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::{
  Error,
  Result,
  clock::{Clock, SystemClock},
  event::{Event, EventUpdate, NewEvent},
  reference::Reference,
  store::DripStore,
  stream::{NewStream, Stream, StreamUpdate},
  subscription::Subscription,
};

#[derive(Default)]
struct Inner {
  streams:       Vec<Stream>,
  events:        Vec<Event>,
  subscriptions: Vec<Subscription>,
}

/// Cloning shares the underlying tables.
#[derive(Clone)]
pub struct MemoryStore {
  inner: Arc<RwLock<Inner>>,
  clock: Arc<dyn Clock>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::with_clock(Arc::new(SystemClock)) }

  /// Stamp `created_at`/`updated_at` from `clock` instead of the wall clock.
  pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
    Self { inner: Arc::default(), clock }
  }
}

impl Default for MemoryStore {
  fn default() -> Self { Self::new() }
}

fn same_triple(sub: &Subscription, subscriber: &Reference, stream_id: Uuid) -> bool {
  sub.stream_id == stream_id && &sub.subscriber == subscriber
}

impl DripStore for MemoryStore {
  type Error = Error;

  // ── Streams ───────────────────────────────────────────────────────────────

  async fn create_stream(&self, input: NewStream) -> Result<Stream> {
    input.validate()?;
    let now = self.clock.now();
    let stream = Stream {
      stream_id:   Uuid::new_v4(),
      origin:      input.origin,
      is_public:   input.is_public,
      unlock_mode: input.unlock_mode,
      start_date:  input.start_date,
      is_active:   input.is_active,
      created_at:  now,
      updated_at:  now,
    };
    self.inner.write().streams.push(stream.clone());
    Ok(stream)
  }

  async fn update_stream(
    &self,
    stream_id: Uuid,
    update: StreamUpdate,
  ) -> Result<Stream> {
    let now = self.clock.now();
    let mut inner = self.inner.write();
    let slot = inner
      .streams
      .iter_mut()
      .find(|s| s.stream_id == stream_id)
      .ok_or(Error::StreamNotFound(stream_id))?;
    let next = update.apply(slot, now)?;
    *slot = next.clone();
    Ok(next)
  }

  async fn get_stream(&self, stream_id: Uuid) -> Result<Option<Stream>> {
    let inner = self.inner.read();
    Ok(inner.streams.iter().find(|s| s.stream_id == stream_id).cloned())
  }

  async fn get_stream_by_origin(&self, origin: &Reference) -> Result<Option<Stream>> {
    let inner = self.inner.read();
    Ok(inner.streams.iter().find(|s| &s.origin == origin).cloned())
  }

  async fn delete_stream(&self, stream_id: Uuid) -> Result<bool> {
    let mut inner = self.inner.write();
    let before = inner.streams.len();
    inner.streams.retain(|s| s.stream_id != stream_id);
    if inner.streams.len() == before {
      return Ok(false);
    }
    inner.events.retain(|e| e.stream_id != stream_id);
    inner.subscriptions.retain(|s| s.stream_id != stream_id);
    Ok(true)
  }

  // ── Events ────────────────────────────────────────────────────────────────

  async fn add_event(&self, input: NewEvent) -> Result<Event> {
    let now = self.clock.now();
    let mut inner = self.inner.write();
    if !inner.streams.iter().any(|s| s.stream_id == input.stream_id) {
      return Err(Error::StreamNotFound(input.stream_id));
    }
    let event = Event {
      event_id:        Uuid::new_v4(),
      stream_id:       input.stream_id,
      content:         input.content,
      offset_interval: input.offset_interval,
      is_visible:      input.is_visible,
      created_at:      now,
      updated_at:      now,
    };
    inner.events.push(event.clone());
    Ok(event)
  }

  async fn update_event(&self, event_id: Uuid, update: EventUpdate) -> Result<Event> {
    let now = self.clock.now();
    let mut inner = self.inner.write();
    let slot = inner
      .events
      .iter_mut()
      .find(|e| e.event_id == event_id)
      .ok_or(Error::EventNotFound(event_id))?;
    *slot = update.apply(slot, now);
    Ok(slot.clone())
  }

  async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>> {
    let inner = self.inner.read();
    Ok(inner.events.iter().find(|e| e.event_id == event_id).cloned())
  }

  async fn list_visible_events(&self, stream_id: Uuid) -> Result<Vec<Event>> {
    let inner = self.inner.read();
    Ok(
      inner
        .events
        .iter()
        .filter(|e| e.stream_id == stream_id && e.is_visible)
        .cloned()
        .collect(),
    )
  }

  // ── Subscriptions ─────────────────────────────────────────────────────────

  async fn find_subscription(
    &self,
    subscriber: &Reference,
    stream_id: Uuid,
  ) -> Result<Option<Subscription>> {
    let inner = self.inner.read();
    Ok(
      inner
        .subscriptions
        .iter()
        .find(|s| same_triple(s, subscriber, stream_id))
        .cloned(),
    )
  }

  async fn insert_subscription_if_absent(
    &self,
    subscriber: &Reference,
    stream_id: Uuid,
    joined_at: DateTime<Utc>,
  ) -> Result<Subscription> {
    let now = self.clock.now();
    let mut inner = self.inner.write();
    if let Some(existing) =
      inner.subscriptions.iter().find(|s| same_triple(s, subscriber, stream_id))
    {
      return Ok(existing.clone());
    }
    if !inner.streams.iter().any(|s| s.stream_id == stream_id) {
      return Err(Error::StreamNotFound(stream_id));
    }
    let sub = Subscription {
      subscription_id: Uuid::new_v4(),
      subscriber: subscriber.clone(),
      stream_id,
      joined_at,
      created_at: now,
      updated_at: now,
    };
    inner.subscriptions.push(sub.clone());
    Ok(sub)
  }

  async fn upsert_subscription(
    &self,
    subscriber: &Reference,
    stream_id: Uuid,
    joined_at: DateTime<Utc>,
  ) -> Result<Subscription> {
    let now = self.clock.now();
    let mut inner = self.inner.write();
    if let Some(existing) = inner
      .subscriptions
      .iter_mut()
      .find(|s| same_triple(s, subscriber, stream_id))
    {
      existing.joined_at = joined_at;
      existing.updated_at = now;
      return Ok(existing.clone());
    }
    if !inner.streams.iter().any(|s| s.stream_id == stream_id) {
      return Err(Error::StreamNotFound(stream_id));
    }
    let sub = Subscription {
      subscription_id: Uuid::new_v4(),
      subscriber: subscriber.clone(),
      stream_id,
      joined_at,
      created_at: now,
      updated_at: now,
    };
    inner.subscriptions.push(sub.clone());
    Ok(sub)
  }

  async fn delete_subscription(
    &self,
    subscriber: &Reference,
    stream_id: Uuid,
  ) -> Result<u64> {
    let mut inner = self.inner.write();
    let before = inner.subscriptions.len();
    inner
      .subscriptions
      .retain(|s| !same_triple(s, subscriber, stream_id));
    Ok((before - inner.subscriptions.len()) as u64)
  }

  async fn list_subscriptions(&self, subscriber: &Reference) -> Result<Vec<Subscription>> {
    let inner = self.inner.read();
    Ok(
      inner
        .subscriptions
        .iter()
        .filter(|s| &s.subscriber == subscriber)
        .cloned()
        .collect(),
    )
  }
}
