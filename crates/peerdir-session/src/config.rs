//! Session configuration.

use std::time::Duration;

use peerdir_core::{Account, Person};
use peerdir_timeline::Grouping;
use serde::Deserialize;

/// Runtime configuration, deserialised from `peerdir.toml` and `PEERDIR_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
  /// How often timelines re-home groups into fresh time categories.
  pub rebucket_interval_secs: u64,
  pub message_group_gap_secs: i64,
  pub call_group_gap_secs:    i64,
  /// How long a name-service answer is reused without asking again.
  pub name_cache_ttl_secs:    i64,
  pub accounts:               Vec<Account>,
  pub persons:                Vec<Person>,
}

impl Default for SessionConfig {
  fn default() -> Self {
    let grouping = Grouping::default();
    Self {
      rebucket_interval_secs: 3600,
      message_group_gap_secs: grouping.message_gap_secs,
      call_group_gap_secs:    grouping.call_gap_secs,
      name_cache_ttl_secs:    peerdir_core::directory::DEFAULT_NAME_CACHE_TTL_SECS,
      accounts:               Vec::new(),
      persons:                Vec::new(),
    }
  }
}

impl SessionConfig {
  pub fn grouping(&self) -> Grouping {
    Grouping {
      call_gap_secs:    self.call_group_gap_secs,
      message_gap_secs: self.message_group_gap_secs,
    }
  }

  pub fn rebucket_interval(&self) -> Duration {
    Duration::from_secs(self.rebucket_interval_secs.max(1))
  }

  pub fn name_cache_ttl(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.name_cache_ttl_secs)
  }
}
