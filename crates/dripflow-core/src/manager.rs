//! The enrollment manager: join/rejoin/leave over a [`DripStore`], plus
//! resolved event listings and their cache keys.

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::{
  Error,
  event::Event,
  reference::Subscriber,
  resolver::StateResolver,
  state::EventState,
  store::DripStore,
  stream::Stream,
  subscription::Subscription,
};

/// Every method is one logical unit: read what it needs, compute, return.
/// Atomicity of the writes is delegated to the store.
pub struct EnrollmentManager<S> {
  store:    S,
  resolver: StateResolver,
}

impl<S: DripStore> EnrollmentManager<S> {
  pub fn new(store: S, resolver: StateResolver) -> Self { Self { store, resolver } }

  pub fn store(&self) -> &S { &self.store }

  pub fn resolver(&self) -> &StateResolver { &self.resolver }

  fn now(&self) -> DateTime<Utc> { self.resolver.clock().now() }

  // ── Lifecycle ─────────────────────────────────────────────────────────

  /// Enrol `subscriber` in `stream`. Idempotent: an existing subscription is
  /// returned unchanged, keeping its original `joined_at`.
  pub async fn join(
    &self,
    subscriber: &(impl Subscriber + ?Sized),
    stream: &Stream,
  ) -> Result<Subscription, S::Error> {
    let who = subscriber.subscriber_ref();
    let sub = self
      .store
      .insert_subscription_if_absent(&who, stream.stream_id, self.now())
      .await?;
    debug!(stream_id = %stream.stream_id, subscriber = %who, joined_at = %sub.joined_at, "joined stream");
    Ok(sub)
  }

  /// Enrol or re-enrol, resetting `joined_at` to now. Restarts every
  /// relative-mode schedule for this subscriber in this stream.
  pub async fn rejoin(
    &self,
    subscriber: &(impl Subscriber + ?Sized),
    stream: &Stream,
  ) -> Result<Subscription, S::Error> {
    let who = subscriber.subscriber_ref();
    let sub = self
      .store
      .upsert_subscription(&who, stream.stream_id, self.now())
      .await?;
    debug!(stream_id = %stream.stream_id, subscriber = %who, joined_at = %sub.joined_at, "rejoined stream");
    Ok(sub)
  }

  /// Remove the subscription. `false` if there was none.
  pub async fn leave(
    &self,
    subscriber: &(impl Subscriber + ?Sized),
    stream: &Stream,
  ) -> Result<bool, S::Error> {
    let who = subscriber.subscriber_ref();
    let removed = self
      .store
      .delete_subscription(&who, stream.stream_id)
      .await?;
    debug!(stream_id = %stream.stream_id, subscriber = %who, removed, "left stream");
    Ok(removed > 0)
  }

  // ── Lookups ───────────────────────────────────────────────────────────

  pub async fn subscription(
    &self,
    subscriber: &(impl Subscriber + ?Sized),
    stream: &Stream,
  ) -> Result<Option<Subscription>, S::Error> {
    self
      .store
      .find_subscription(&subscriber.subscriber_ref(), stream.stream_id)
      .await
  }

  pub async fn is_joined(
    &self,
    subscriber: &(impl Subscriber + ?Sized),
    stream: &Stream,
  ) -> Result<bool, S::Error> {
    Ok(self.subscription(subscriber, stream).await?.is_some())
  }

  /// Every stream `subscriber` is enrolled in.
  pub async fn subscriptions_of(
    &self,
    subscriber: &(impl Subscriber + ?Sized),
  ) -> Result<Vec<Subscription>, S::Error> {
    self
      .store
      .list_subscriptions(&subscriber.subscriber_ref())
      .await
  }

  async fn subscription_for(
    &self,
    subscriber: Option<&dyn Subscriber>,
    stream_id: uuid::Uuid,
  ) -> Result<Option<Subscription>, S::Error> {
    match subscriber {
      Some(s) => {
        self
          .store
          .find_subscription(&s.subscriber_ref(), stream_id)
          .await
      }
      None => Ok(None),
    }
  }

  // ── Resolution ────────────────────────────────────────────────────────

  /// Resolve every visible event of `stream` for `subscriber` (`None` for a
  /// guest), in store order.
  ///
  /// The result is a pure function of the stored rows and the clock; cache it
  /// under [`Self::get_cache_key`] if needed.
  pub async fn get_stream_events(
    &self,
    subscriber: Option<&dyn Subscriber>,
    stream: &Stream,
  ) -> Result<Vec<EventState>, S::Error> {
    let subscription = self.subscription_for(subscriber, stream.stream_id).await?;
    let events = self.store.list_visible_events(stream.stream_id).await?;
    let now = self.now();

    events
      .iter()
      .map(|event| {
        let state = self
          .resolver
          .resolve_state_at(event, stream, subscription.as_ref(), now)?;
        trace!(event_id = %event.event_id, state = %state.state, "resolved event");
        Ok(state)
      })
      .collect::<Result<Vec<_>, Error>>()
      .map_err(Into::into)
  }

  /// Resolve a single event, loading its stream and the subscriber's
  /// subscription.
  pub async fn resolve_event(
    &self,
    subscriber: Option<&dyn Subscriber>,
    event: &Event,
  ) -> Result<EventState, S::Error> {
    let stream = self
      .store
      .get_stream(event.stream_id)
      .await?
      .ok_or(Error::StreamNotFound(event.stream_id))?;
    let subscription = self.subscription_for(subscriber, stream.stream_id).await?;
    Ok(
      self
        .resolver
        .resolve_state(event, &stream, subscription.as_ref())?,
    )
  }

  /// A key that changes whenever the result of [`Self::get_stream_events`]
  /// could: on stream updates (`updated_at`) and on (re)joins (`joined_at`).
  ///
  /// `dripflow:events:{stream}:{guest|type:id}:{updated_at µs}:{joined_at µs|none}`
  pub async fn get_cache_key(
    &self,
    subscriber: Option<&dyn Subscriber>,
    stream: &Stream,
  ) -> Result<String, S::Error> {
    let subscriber_key = match subscriber {
      Some(s) => format!("{}:{}", s.subscriber_type(), s.subscriber_id()),
      None => "guest".to_owned(),
    };
    let joined_key = self
      .subscription_for(subscriber, stream.stream_id)
      .await?
      .map(|sub| sub.joined_at.timestamp_micros().to_string())
      .unwrap_or_else(|| "none".to_owned());

    Ok(format!(
      "dripflow:events:{}:{}:{}:{}",
      stream.stream_id,
      subscriber_key,
      stream.updated_at.timestamp_micros(),
      joined_key,
    ))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use chrono::{Duration, TimeZone};
  use serde_json::json;

  use super::*;
  use crate::{
    clock::FixedClock,
    content::{ContentCatalog, Payload, StaticContent},
    event::NewEvent,
    memory::MemoryStore,
    reference::Reference,
    state::AccessState,
    strategy::StrategyRegistry,
    stream::{NewStream, StreamUpdate},
  };

  struct Fixture {
    clock:   Arc<FixedClock>,
    manager: EnrollmentManager<MemoryStore>,
  }

  fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 9, 1, 10, 0, 0).unwrap() }

  fn fixture() -> Fixture {
    let clock = Arc::new(FixedClock::new(t0()));
    let mut catalog = ContentCatalog::new();
    for id in 1..=3 {
      let mut teaser = Payload::new();
      teaser.insert("title".into(), json!(format!("Lesson {id}")));
      let mut full = teaser.clone();
      full.insert("content".into(), json!(format!("Body {id}")));
      catalog.insert(Reference::new("lesson", id), StaticContent { teaser, full });
    }
    let resolver = StateResolver::new(
      StrategyRegistry::standard(),
      clock.clone(),
      Arc::new(catalog),
    );
    let store = MemoryStore::with_clock(clock.clone());
    Fixture { clock, manager: EnrollmentManager::new(store, resolver) }
  }

  fn user(id: i64) -> Reference { Reference::new("user", id) }

  fn lesson(id: i64) -> Reference { Reference::new("lesson", id) }

  async fn private_relative(f: &Fixture) -> Stream {
    f.manager
      .store()
      .create_stream(NewStream::new(Reference::new("course", 1)).private())
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn join_creates_subscription() {
    let f = fixture();
    let stream = private_relative(&f).await;

    let sub = f.manager.join(&user(1), &stream).await.unwrap();
    assert_eq!(sub.subscriber, user(1));
    assert_eq!(sub.stream_id, stream.stream_id);
    assert_eq!(sub.joined_at, t0());
    assert!(f.manager.is_joined(&user(1), &stream).await.unwrap());
  }

  #[tokio::test]
  async fn join_is_idempotent() {
    let f = fixture();
    let stream = private_relative(&f).await;

    let first = f.manager.join(&user(1), &stream).await.unwrap();
    f.clock.advance(Duration::hours(2));
    let second = f.manager.join(&user(1), &stream).await.unwrap();

    assert_eq!(first.subscription_id, second.subscription_id);
    assert_eq!(first.joined_at, second.joined_at);
    assert_eq!(f.manager.subscriptions_of(&user(1)).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn rejoin_resets_joined_at_on_same_row() {
    let f = fixture();
    let stream = private_relative(&f).await;

    let first = f.manager.join(&user(1), &stream).await.unwrap();
    let immediate = f.manager.rejoin(&user(1), &stream).await.unwrap();
    assert!(immediate.joined_at >= first.joined_at);

    f.clock.advance(Duration::seconds(1));
    let later = f.manager.rejoin(&user(1), &stream).await.unwrap();
    assert_eq!(later.subscription_id, first.subscription_id);
    assert!(later.joined_at > first.joined_at);
  }

  #[tokio::test]
  async fn rejoin_without_prior_join_creates() {
    let f = fixture();
    let stream = private_relative(&f).await;
    let sub = f.manager.rejoin(&user(5), &stream).await.unwrap();
    assert_eq!(sub.joined_at, t0());
    assert!(f.manager.is_joined(&user(5), &stream).await.unwrap());
  }

  #[tokio::test]
  async fn leave_reports_whether_a_row_was_removed() {
    let f = fixture();
    let stream = private_relative(&f).await;

    assert!(!f.manager.leave(&user(1), &stream).await.unwrap());
    f.manager.join(&user(1), &stream).await.unwrap();
    assert!(f.manager.leave(&user(1), &stream).await.unwrap());
    assert!(!f.manager.leave(&user(1), &stream).await.unwrap());
    assert!(f.manager.subscriptions_of(&user(1)).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn stream_events_follow_schedule() {
    let f = fixture();
    let stream = private_relative(&f).await;
    let store = f.manager.store();
    store
      .add_event(NewEvent::new(stream.stream_id, lesson(1)))
      .await
      .unwrap();
    store
      .add_event(NewEvent::new(stream.stream_id, lesson(2)).with_offset("P1D"))
      .await
      .unwrap();
    store
      .add_event(NewEvent::new(stream.stream_id, lesson(3)).hidden())
      .await
      .unwrap();

    f.manager.join(&user(1), &stream).await.unwrap();
    f.clock.advance(Duration::hours(1));

    let states = f
      .manager
      .get_stream_events(Some(&user(1)), &stream)
      .await
      .unwrap();
    assert_eq!(states.len(), 2);
    assert_eq!(states[0].content, lesson(1));
    assert_eq!(states[0].state, AccessState::Opened);
    assert_eq!(states[0].payload()["content"], json!("Body 1"));
    assert_eq!(states[1].content, lesson(2));
    assert_eq!(states[1].state, AccessState::Locked);
    assert_eq!(states[1].unlocks_at, Some(t0() + Duration::days(1)));
    assert!(!states[1].payload().contains_key("content"));

    let guest = f.manager.get_stream_events(None, &stream).await.unwrap();
    assert!(guest.iter().all(|s| s.state.is_hidden()));
  }

  #[tokio::test]
  async fn inactive_stream_events_are_hidden() {
    let f = fixture();
    let stream = f
      .manager
      .store()
      .create_stream(NewStream::new(Reference::new("course", 1)).inactive())
      .await
      .unwrap();
    f.manager
      .store()
      .add_event(NewEvent::new(stream.stream_id, lesson(1)))
      .await
      .unwrap();
    f.manager.join(&user(1), &stream).await.unwrap();

    let states = f
      .manager
      .get_stream_events(Some(&user(1)), &stream)
      .await
      .unwrap();
    assert_eq!(states.len(), 1);
    assert!(states[0].state.is_hidden());
  }

  #[tokio::test]
  async fn invalid_offset_fails_the_listing() {
    let f = fixture();
    let stream = private_relative(&f).await;
    f.manager
      .store()
      .add_event(NewEvent::new(stream.stream_id, lesson(1)).with_offset("INVALID_FORMAT"))
      .await
      .unwrap();
    f.manager.join(&user(1), &stream).await.unwrap();

    let err = f
      .manager
      .get_stream_events(Some(&user(1)), &stream)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Validation(ref m) if m.contains("INVALID_FORMAT")));
  }

  #[tokio::test]
  async fn resolve_event_loads_stream_and_subscription() {
    let f = fixture();
    let stream = private_relative(&f).await;
    let event = f
      .manager
      .store()
      .add_event(NewEvent::new(stream.stream_id, lesson(1)).with_offset("3600"))
      .await
      .unwrap();
    f.manager.join(&user(1), &stream).await.unwrap();

    let state = f
      .manager
      .resolve_event(Some(&user(1)), &event)
      .await
      .unwrap();
    assert_eq!(state.state, AccessState::Locked);

    f.clock.advance(Duration::hours(1));
    let state = f
      .manager
      .resolve_event(Some(&user(1)), &event)
      .await
      .unwrap();
    assert_eq!(state.state, AccessState::Opened);
  }

  #[tokio::test]
  async fn cache_keys_distinguish_subscribers_and_guests() {
    let f = fixture();
    let stream = private_relative(&f).await;
    f.manager.join(&user(1), &stream).await.unwrap();
    f.manager.join(&user(2), &stream).await.unwrap();

    let k1 = f.manager.get_cache_key(Some(&user(1)), &stream).await.unwrap();
    let k2 = f.manager.get_cache_key(Some(&user(2)), &stream).await.unwrap();
    let guest = f.manager.get_cache_key(None, &stream).await.unwrap();

    assert_ne!(k1, k2);
    assert_ne!(k1, guest);
    assert_ne!(k2, guest);
    assert!(k1.contains(&stream.stream_id.to_string()));
    assert!(guest.contains(":guest:"));
    assert!(guest.ends_with(":none"));

    // Deterministic for identical inputs.
    assert_eq!(
      k1,
      f.manager.get_cache_key(Some(&user(1)), &stream).await.unwrap()
    );
  }

  #[tokio::test]
  async fn cache_key_for_unsubscribed_user_uses_none() {
    let f = fixture();
    let stream = private_relative(&f).await;
    let key = f.manager.get_cache_key(Some(&user(9)), &stream).await.unwrap();
    assert!(key.contains(":user:9:"));
    assert!(key.ends_with(":none"));
  }

  #[tokio::test]
  async fn cache_key_changes_after_rejoin_and_stream_update() {
    let f = fixture();
    let stream = private_relative(&f).await;
    f.manager.join(&user(1), &stream).await.unwrap();
    let original = f.manager.get_cache_key(Some(&user(1)), &stream).await.unwrap();

    f.clock.advance(Duration::milliseconds(5));
    f.manager.rejoin(&user(1), &stream).await.unwrap();
    let after_rejoin = f.manager.get_cache_key(Some(&user(1)), &stream).await.unwrap();
    assert_ne!(original, after_rejoin);

    f.clock.advance(Duration::milliseconds(5));
    let updated = f
      .manager
      .store()
      .update_stream(
        stream.stream_id,
        StreamUpdate { is_public: Some(true), ..Default::default() },
      )
      .await
      .unwrap();
    let after_update = f.manager.get_cache_key(Some(&user(1)), &updated).await.unwrap();
    assert_ne!(after_rejoin, after_update);
  }
}
