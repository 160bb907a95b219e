//! The content capability and how references are mapped to it.
//!
//! The engine never builds payloads itself. A content type implements
//! [`ContentSource`] to say what a locked visitor may see (the teaser) and
//! what an unlocked one gets (the full payload); a [`ContentResolver`] maps
//! an event's content [`Reference`] to that implementation.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, reference::Reference};

/// An opaque JSON object handed back to the caller untouched.
pub type Payload = serde_json::Map<String, serde_json::Value>;

pub trait ContentSource: Send + Sync {
  /// Data released while the event is locked.
  fn teaser_payload(&self) -> Payload { Payload::new() }

  /// Data released once the event is opened.
  fn full_payload(&self) -> Payload { Payload::new() }
}

/// Maps a content reference to its source.
pub trait ContentResolver: Send + Sync {
  fn resolve(&self, content: &Reference) -> Result<Arc<dyn ContentSource>>;
}

impl<F> ContentResolver for F
where
  F: Fn(&Reference) -> Option<Arc<dyn ContentSource>> + Send + Sync,
{
  fn resolve(&self, content: &Reference) -> Result<Arc<dyn ContentSource>> {
    self(content).ok_or_else(|| Error::ContentNotFound(content.clone()))
  }
}

// ─── Static content ──────────────────────────────────────────────────────────

/// Content whose payloads are fixed values, e.g. loaded from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticContent {
  #[serde(default)]
  pub teaser: Payload,
  #[serde(default)]
  pub full:   Payload,
}

impl ContentSource for StaticContent {
  fn teaser_payload(&self) -> Payload { self.teaser.clone() }

  fn full_payload(&self) -> Payload { self.full.clone() }
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// An in-memory [`ContentResolver`] keyed by reference.
#[derive(Clone, Default)]
pub struct ContentCatalog {
  entries: HashMap<Reference, Arc<dyn ContentSource>>,
}

impl ContentCatalog {
  pub fn new() -> Self { Self::default() }

  pub fn insert(
    &mut self,
    content: Reference,
    source: impl ContentSource + 'static,
  ) -> &mut Self {
    self.entries.insert(content, Arc::new(source));
    self
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl ContentResolver for ContentCatalog {
  fn resolve(&self, content: &Reference) -> Result<Arc<dyn ContentSource>> {
    self
      .entries
      .get(content)
      .cloned()
      .ok_or_else(|| Error::ContentNotFound(content.clone()))
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  struct Bare;

  impl ContentSource for Bare {}

  #[test]
  fn default_payloads_are_empty() {
    assert!(Bare.teaser_payload().is_empty());
    assert!(Bare.full_payload().is_empty());
  }

  #[test]
  fn catalog_resolves_known_and_rejects_unknown() {
    let mut catalog = ContentCatalog::new();
    let mut full = Payload::new();
    full.insert("content".into(), json!("body"));
    catalog.insert(
      Reference::new("lesson", 1),
      StaticContent { teaser: Payload::new(), full },
    );

    let source = catalog.resolve(&Reference::new("lesson", 1)).unwrap();
    assert_eq!(source.full_payload()["content"], json!("body"));

    let err = catalog.resolve(&Reference::new("lesson", 2)).err().unwrap();
    assert!(matches!(err, Error::ContentNotFound(r) if r.id == 2));
  }

  #[test]
  fn closures_are_resolvers() {
    let resolver = |r: &Reference| -> Option<Arc<dyn ContentSource>> {
      (r.kind == "lesson").then(|| Arc::new(Bare) as Arc<dyn ContentSource>)
    };
    assert!(resolver.resolve(&Reference::new("lesson", 9)).is_ok());
    assert!(resolver.resolve(&Reference::new("video", 9)).is_err());
  }
}
