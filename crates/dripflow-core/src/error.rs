//! Error types for `dripflow-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::reference::Reference;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed input: an unparsable `offset_interval`, or a stream write that
  /// breaks the fixed-mode invariant.
  #[error("validation error: {0}")]
  Validation(String),

  /// The resolver was asked to use an unlock mode nobody registered a
  /// strategy for, or configuration named an unknown mode or strategy.
  #[error("configuration error: {0}")]
  Configuration(String),

  #[error("no content registered for {0}")]
  ContentNotFound(Reference),

  #[error("stream not found: {0}")]
  StreamNotFound(Uuid),

  #[error("event not found: {0}")]
  EventNotFound(Uuid),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
