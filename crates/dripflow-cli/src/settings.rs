//! Runtime configuration for the `dripflow` binary.
//!
//! Loaded from an optional TOML file and `DRIPFLOW_*` environment variables:
//!
//! ```toml
//! store_path = "~/.local/share/dripflow/drip.db"
//!
//! [strategies]
//! fixed    = "fixed_date"
//! relative = "relative_delay"
//!
//! [[content]]
//! type   = "lesson"
//! id     = 1
//! teaser = { title = "Welcome" }
//! full   = { title = "Welcome", video = "intro.mp4" }
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use dripflow_core::{
  config::DripConfig,
  content::{ContentCatalog, Payload, StaticContent},
  reference::Reference,
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,

  /// The `strategies` table.
  #[serde(flatten)]
  pub engine: DripConfig,

  /// Payloads served for event content, keyed by `(type, id)`.
  #[serde(default)]
  pub content: Vec<ContentEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
  #[serde(rename = "type")]
  pub kind:   String,
  pub id:     i64,
  #[serde(default)]
  pub teaser: Payload,
  #[serde(default)]
  pub full:   Payload,
}

fn default_store_path() -> PathBuf { PathBuf::from("dripflow.db") }

impl CliConfig {
  /// Read `path` (if it exists) and the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("DRIPFLOW"))
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise CliConfig")
  }

  /// `store_path` with a leading `~` expanded.
  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }

  pub fn catalog(&self) -> ContentCatalog {
    let mut catalog = ContentCatalog::new();
    for entry in &self.content {
      catalog.insert(Reference::new(entry.kind.clone(), entry.id), StaticContent {
        teaser: entry.teaser.clone(),
        full:   entry.full.clone(),
      });
    }
    catalog
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use dripflow_core::{
    content::ContentResolver,
    strategy::{StrategyKind, StrategyRegistry},
    stream::UnlockMode,
  };

  use super::*;

  fn parse(toml: &str) -> CliConfig {
    config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_file_uses_defaults() {
    let cfg = parse("");
    assert_eq!(cfg.store_path, PathBuf::from("dripflow.db"));
    assert_eq!(cfg.engine, DripConfig::default());
    assert!(cfg.content.is_empty());
  }

  #[test]
  fn strategies_table_feeds_the_registry() {
    let cfg = parse(
      r#"
        [strategies]
        fixed    = "fixed_date"
        relative = "fixed_date"
      "#,
    );
    assert_eq!(cfg.engine.strategies["relative"], StrategyKind::FixedDate);

    let registry = StrategyRegistry::from_config(&cfg.engine).unwrap();
    assert!(registry.get(UnlockMode::Relative).is_ok());
  }

  #[test]
  fn content_entries_build_a_catalog() {
    let cfg = parse(
      r#"
        [[content]]
        type   = "lesson"
        id     = 1
        teaser = { title = "Welcome" }
        full   = { title = "Welcome", video = "intro.mp4" }

        [[content]]
        type = "lesson"
        id   = 2
      "#,
    );
    let catalog = cfg.catalog();
    assert_eq!(catalog.len(), 2);

    let first = catalog.resolve(&Reference::new("lesson", 1)).unwrap();
    assert_eq!(first.full_payload()["video"], "intro.mp4");
    assert!(!first.teaser_payload().contains_key("video"));

    let second = catalog.resolve(&Reference::new("lesson", 2)).unwrap();
    assert!(second.full_payload().is_empty());
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    let expanded = expand_tilde(Path::new("~/drip.db"));
    assert_eq!(expanded, PathBuf::from(home).join("drip.db"));
    assert_eq!(expand_tilde(Path::new("/tmp/drip.db")), PathBuf::from("/tmp/drip.db"));
  }
}
