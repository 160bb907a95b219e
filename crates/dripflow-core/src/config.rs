//! Engine configuration.
//!
//! Deserialised by the host (the CLI reads it from TOML and `DRIPFLOW_*`
//! environment variables) and turned into a
//! [`StrategyRegistry`](crate::strategy::StrategyRegistry) once at startup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::strategy::StrategyKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DripConfig {
  /// Unlock mode name (`"fixed"`, `"relative"`) → strategy implementation.
  #[serde(default = "default_strategies")]
  pub strategies: BTreeMap<String, StrategyKind>,
}

impl Default for DripConfig {
  fn default() -> Self { Self { strategies: default_strategies() } }
}

fn default_strategies() -> BTreeMap<String, StrategyKind> {
  BTreeMap::from([
    ("fixed".to_owned(), StrategyKind::FixedDate),
    ("relative".to_owned(), StrategyKind::RelativeDelay),
  ])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_table_uses_defaults() {
    let config: DripConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, DripConfig::default());
  }

  #[test]
  fn explicit_table_replaces_defaults() {
    let config: DripConfig =
      serde_json::from_str(r#"{"strategies":{"relative":"fixed_date"}}"#)
        .unwrap();
    assert_eq!(config.strategies.len(), 1);
    assert_eq!(config.strategies["relative"], StrategyKind::FixedDate);
  }
}
