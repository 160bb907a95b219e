//! Unlock strategies and the registry the resolver selects them from.
//!
//! A strategy answers one question: at what instant does this event open for
//! this subscription? `None` means "already open". A strategy never returns an
//! instant that is not strictly in the future.

use std::{collections::BTreeMap, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
  Error,
  Result,
  config::DripConfig,
  event::Event,
  stream::{Stream, UnlockMode},
  subscription::Subscription,
};

pub trait UnlockStrategy: Send + Sync {
  /// The instant the event unlocks, or `None` if it is already unlocked.
  ///
  /// Fails only when the event's `offset_interval` does not parse.
  fn calculate_unlock_time(
    &self,
    event: &Event,
    stream: &Stream,
    subscription: Option<&Subscription>,
    now: DateTime<Utc>,
  ) -> Result<Option<DateTime<Utc>>>;

  fn is_unlocked(
    &self,
    event: &Event,
    stream: &Stream,
    subscription: Option<&Subscription>,
    now: DateTime<Utc>,
  ) -> Result<bool> {
    Ok(
      self
        .calculate_unlock_time(event, stream, subscription, now)?
        .is_none(),
    )
  }
}

/// `anchor + offset`, or `None` once that instant is no longer ahead of `now`.
fn future_only(
  anchor: DateTime<Utc>,
  event: &Event,
  now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
  let offset = event.offset()?;
  let unlock_at = anchor.checked_add_signed(offset).ok_or_else(|| {
    Error::Validation(format!(
      "offset_interval '{}' overflows the calendar",
      event.offset_interval
    ))
  })?;
  Ok((unlock_at > now).then_some(unlock_at))
}

// ─── Fixed date ──────────────────────────────────────────────────────────────

/// Same calendar instant for everybody: the stream's `start_date` plus the
/// event's offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDateStrategy;

impl UnlockStrategy for FixedDateStrategy {
  fn calculate_unlock_time(
    &self,
    event: &Event,
    stream: &Stream,
    _subscription: Option<&Subscription>,
    now: DateTime<Utc>,
  ) -> Result<Option<DateTime<Utc>>> {
    // Writes reject fixed streams without a start date, so this is only
    // reachable for rows written around the store.
    let Some(start_date) = stream.start_date else {
      return Ok(None);
    };
    future_only(start_date, event, now)
  }
}

// ─── Relative delay ──────────────────────────────────────────────────────────

/// Per-subscriber schedule: the subscription's `joined_at` plus the event's
/// offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelativeDelayStrategy;

impl UnlockStrategy for RelativeDelayStrategy {
  fn calculate_unlock_time(
    &self,
    event: &Event,
    _stream: &Stream,
    subscription: Option<&Subscription>,
    now: DateTime<Utc>,
  ) -> Result<Option<DateTime<Utc>>> {
    // No enrollment means no anchor. Private streams never get here (the
    // resolver hides them first), so this is a public stream's guest view.
    let Some(subscription) = subscription else {
      return Ok(None);
    };
    future_only(subscription.joined_at, event, now)
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// The built-in strategy implementations, as named in configuration.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
  FixedDate,
  RelativeDelay,
}

impl StrategyKind {
  pub fn build(self) -> Arc<dyn UnlockStrategy> {
    match self {
      Self::FixedDate => Arc::new(FixedDateStrategy),
      Self::RelativeDelay => Arc::new(RelativeDelayStrategy),
    }
  }
}

/// `UnlockMode → strategy`, built once and handed to the resolver.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
  strategies: BTreeMap<UnlockMode, Arc<dyn UnlockStrategy>>,
}

impl StrategyRegistry {
  /// An empty registry; every lookup fails until strategies are registered.
  pub fn empty() -> Self { Self::default() }

  /// `fixed → FixedDateStrategy`, `relative → RelativeDelayStrategy`.
  pub fn standard() -> Self {
    let mut registry = Self::empty();
    registry
      .register(UnlockMode::Fixed, FixedDateStrategy)
      .register(UnlockMode::Relative, RelativeDelayStrategy);
    registry
  }

  /// Build from the `strategies` table of a [`DripConfig`]. Mode names that
  /// are not an [`UnlockMode`] are rejected rather than ignored.
  pub fn from_config(config: &DripConfig) -> Result<Self> {
    let mut registry = Self::empty();
    for (mode, kind) in &config.strategies {
      let mode = UnlockMode::from_str(mode).map_err(|_| {
        Error::Configuration(format!("unknown unlock mode in strategies: {mode:?}"))
      })?;
      registry.register_arc(mode, kind.build());
    }
    Ok(registry)
  }

  pub fn register(
    &mut self,
    mode: UnlockMode,
    strategy: impl UnlockStrategy + 'static,
  ) -> &mut Self {
    self.register_arc(mode, Arc::new(strategy))
  }

  pub fn register_arc(
    &mut self,
    mode: UnlockMode,
    strategy: Arc<dyn UnlockStrategy>,
  ) -> &mut Self {
    self.strategies.insert(mode, strategy);
    self
  }

  pub fn get(&self, mode: UnlockMode) -> Result<&Arc<dyn UnlockStrategy>> {
    self.strategies.get(&mode).ok_or_else(|| {
      Error::Configuration(format!(
        "no unlock strategy registered for mode \"{mode}\""
      ))
    })
  }

  pub fn modes(&self) -> impl Iterator<Item = UnlockMode> + '_ {
    self.strategies.keys().copied()
  }
}
