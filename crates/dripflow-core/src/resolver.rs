//! The state resolver: stream rules + unlock strategy → [`EventState`].

use std::sync::Arc;

use chrono::{DateTime, Months, Utc};

use crate::{
  Result,
  clock::Clock,
  content::ContentResolver,
  event::Event,
  state::{AccessState, EventState},
  stream::Stream,
  strategy::StrategyRegistry,
  subscription::Subscription,
};

/// Classifies events. Holds no per-call state; the clock, the strategy
/// registry and the content resolver are fixed at construction.
#[derive(Clone)]
pub struct StateResolver {
  strategies: StrategyRegistry,
  clock:      Arc<dyn Clock>,
  content:    Arc<dyn ContentResolver>,
}

impl StateResolver {
  pub fn new(
    strategies: StrategyRegistry,
    clock: Arc<dyn Clock>,
    content: Arc<dyn ContentResolver>,
  ) -> Self {
    Self { strategies, clock, content }
  }

  pub fn clock(&self) -> &Arc<dyn Clock> { &self.clock }

  pub fn strategies(&self) -> &StrategyRegistry { &self.strategies }

  /// Decide what `subscription` (if any) may see of `event`.
  ///
  /// First match wins:
  ///
  /// 1. inactive stream → `Hidden`
  /// 2. private stream and no subscription → `Hidden`
  /// 3. the strategy bound to the stream's unlock mode says unlocked →
  ///    `Opened`, otherwise `Locked` with the computed unlock instant.
  ///
  /// Errors with [`crate::Error::Configuration`] if no strategy is
  /// registered for the mode and [`crate::Error::Validation`] if the event's
  /// offset does not parse.
  pub fn resolve_state(
    &self,
    event: &Event,
    stream: &Stream,
    subscription: Option<&Subscription>,
  ) -> Result<EventState> {
    let now = self.clock.now();
    self.resolve_state_at(event, stream, subscription, now)
  }

  /// [`Self::resolve_state`] against an explicit instant.
  pub fn resolve_state_at(
    &self,
    event: &Event,
    stream: &Stream,
    subscription: Option<&Subscription>,
    now: DateTime<Utc>,
  ) -> Result<EventState> {
    let source = self.content.resolve(&event.content)?;
    let never = never_unlocks(now);

    let build = |state, unlocks_at| EventState {
      event_id: event.event_id,
      content: event.content.clone(),
      source: source.clone(),
      state,
      unlocks_at: Some(unlocks_at),
      resolved_at: now,
    };

    if !stream.is_active {
      return Ok(build(AccessState::Hidden, never));
    }
    if !stream.is_public && subscription.is_none() {
      return Ok(build(AccessState::Hidden, never));
    }

    let strategy = self.strategies.get(stream.unlock_mode)?;
    let unlock_time =
      strategy.calculate_unlock_time(event, stream, subscription, now)?;
    let unlocked = strategy.is_unlocked(event, stream, subscription, now)?;

    let state = if unlocked {
      AccessState::Opened
    } else {
      AccessState::Locked
    };
    Ok(build(state, unlock_time.unwrap_or(never)))
  }
}

/// The placeholder instant for events that will not open on their own: a
/// century after `now`.
pub fn never_unlocks(now: DateTime<Utc>) -> DateTime<Utc> {
  now
    .checked_add_months(Months::new(1200))
    .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use serde_json::json;
  use uuid::Uuid;

  use super::*;
  use crate::{
    Error,
    clock::FixedClock,
    content::{ContentCatalog, Payload, StaticContent},
    reference::Reference,
    strategy::RelativeDelayStrategy,
    stream::UnlockMode,
  };

  fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap() }

  fn catalog() -> ContentCatalog {
    let mut teaser = Payload::new();
    teaser.insert("title".into(), json!("Intro"));
    let mut full = teaser.clone();
    full.insert("content".into(), json!("Welcome"));
    let mut catalog = ContentCatalog::new();
    catalog.insert(Reference::new("lesson", 1), StaticContent { teaser, full });
    catalog
  }

  fn resolver_with(registry: StrategyRegistry, now: DateTime<Utc>) -> StateResolver {
    StateResolver::new(
      registry,
      Arc::new(FixedClock::new(now)),
      Arc::new(catalog()),
    )
  }

  fn resolver(now: DateTime<Utc>) -> StateResolver {
    resolver_with(StrategyRegistry::standard(), now)
  }

  fn stream(mode: UnlockMode, is_public: bool, is_active: bool) -> Stream {
    Stream {
      stream_id: Uuid::new_v4(),
      origin: Reference::new("course", 1),
      is_public,
      unlock_mode: mode,
      start_date: (mode == UnlockMode::Fixed).then(t0),
      is_active,
      created_at: t0(),
      updated_at: t0(),
    }
  }

  fn event(stream: &Stream, offset: &str) -> Event {
    Event {
      event_id:        Uuid::new_v4(),
      stream_id:       stream.stream_id,
      content:         Reference::new("lesson", 1),
      offset_interval: offset.into(),
      is_visible:      true,
      created_at:      t0(),
      updated_at:      t0(),
    }
  }

  fn subscription(stream: &Stream, joined_at: DateTime<Utc>) -> Subscription {
    Subscription {
      subscription_id: Uuid::new_v4(),
      subscriber: Reference::new("user", 1),
      stream_id: stream.stream_id,
      joined_at,
      created_at: joined_at,
      updated_at: joined_at,
    }
  }

  #[test]
  fn inactive_stream_hides_everything() {
    let r = resolver(t0() + Duration::days(365));
    for mode in [UnlockMode::Fixed, UnlockMode::Relative] {
      for is_public in [true, false] {
        let s = stream(mode, is_public, false);
        let sub = subscription(&s, t0());
        for sub in [None, Some(&sub)] {
          let state = r.resolve_state(&event(&s, "0"), &s, sub).unwrap();
          assert_eq!(state.state, AccessState::Hidden);
          assert!(state.payload().is_empty());
        }
      }
    }
  }

  #[test]
  fn inactive_stream_hides_before_parsing_offset() {
    let r = resolver(t0());
    let s = stream(UnlockMode::Fixed, true, false);
    let state = r
      .resolve_state(&event(&s, "INVALID_FORMAT"), &s, None)
      .unwrap();
    assert!(state.state.is_hidden());
  }

  #[test]
  fn private_stream_without_subscription_is_hidden() {
    let now = t0();
    let r = resolver(now);
    let s = stream(UnlockMode::Relative, false, true);
    let state = r.resolve_state(&event(&s, "0"), &s, None).unwrap();
    assert_eq!(state.state, AccessState::Hidden);
    assert_eq!(state.unlocks_at, Some(never_unlocks(now)));
  }

  #[test]
  fn zero_offset_opens_under_both_modes() {
    let r = resolver(t0() + Duration::minutes(1));
    for mode in [UnlockMode::Fixed, UnlockMode::Relative] {
      let s = stream(mode, false, true);
      let sub = subscription(&s, t0());
      let state = r.resolve_state(&event(&s, "0"), &s, Some(&sub)).unwrap();
      assert_eq!(state.state, AccessState::Opened, "{mode}");
      assert_eq!(state.payload()["content"], json!("Welcome"));
    }
  }

  #[test]
  fn future_offset_locks_with_exact_instant() {
    let now = t0() + Duration::hours(1);
    let r = resolver(now);
    let s = stream(UnlockMode::Relative, false, true);
    let sub = subscription(&s, t0());
    let state = r
      .resolve_state(&event(&s, "172800"), &s, Some(&sub))
      .unwrap();
    assert_eq!(state.state, AccessState::Locked);
    assert_eq!(state.unlocks_at, Some(t0() + Duration::seconds(172_800)));
    assert_eq!(state.payload()["title"], json!("Intro"));
    assert!(!state.payload().contains_key("content"));
    assert_eq!(state.time_remaining().as_deref(), Some("1 day from now"));
  }

  #[test]
  fn fixed_stream_opens_after_start_plus_offset() {
    let s = stream(UnlockMode::Fixed, true, true);
    let e = event(&s, "86400");

    let before = resolver(t0()).resolve_state(&e, &s, None).unwrap();
    assert_eq!(before.state, AccessState::Locked);
    assert_eq!(before.unlocks_at, Some(t0() + Duration::days(1)));

    let after = resolver(t0() + Duration::days(1))
      .resolve_state(&e, &s, None)
      .unwrap();
    assert_eq!(after.state, AccessState::Opened);
  }

  #[test]
  fn public_fixed_stream_in_the_past_opens_for_guests() {
    let mut s = stream(UnlockMode::Fixed, true, true);
    s.start_date = Some(t0() - Duration::days(10));
    let state = resolver(t0())
      .resolve_state(&event(&s, "0"), &s, None)
      .unwrap();
    assert_eq!(state.state, AccessState::Opened);
  }

  #[test]
  fn public_relative_stream_opens_for_guests() {
    let s = stream(UnlockMode::Relative, true, true);
    let state = resolver(t0())
      .resolve_state(&event(&s, "P30D"), &s, None)
      .unwrap();
    assert_eq!(state.state, AccessState::Opened);
  }

  #[test]
  fn invalid_offset_is_a_validation_error() {
    let s = stream(UnlockMode::Relative, true, true);
    let sub = subscription(&s, t0());
    let err = resolver(t0())
      .resolve_state(&event(&s, "INVALID_FORMAT"), &s, Some(&sub))
      .unwrap_err();
    assert!(matches!(err, Error::Validation(ref m) if m.contains("INVALID_FORMAT")));
  }

  #[test]
  fn unregistered_mode_is_a_configuration_error() {
    let mut registry = StrategyRegistry::empty();
    registry.register(UnlockMode::Relative, RelativeDelayStrategy);
    let s = stream(UnlockMode::Fixed, true, true);
    let err = resolver_with(registry, t0())
      .resolve_state(&event(&s, "0"), &s, None)
      .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
  }

  #[test]
  fn unknown_content_is_reported() {
    let s = stream(UnlockMode::Relative, true, true);
    let mut e = event(&s, "0");
    e.content = Reference::new("video", 404);
    let err = resolver(t0()).resolve_state(&e, &s, None).unwrap_err();
    assert!(matches!(err, Error::ContentNotFound(ref r) if r.id == 404));
  }

  #[test]
  fn never_unlocks_is_a_century_out() {
    assert_eq!(
      never_unlocks(t0()),
      Utc.with_ymd_and_hms(2124, 6, 1, 8, 0, 0).unwrap()
    );
  }
}
