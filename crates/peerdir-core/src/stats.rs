//! Usage statistics kept per canonical contact method.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::event::EventCategory;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStatistics {
  pub counts:          BTreeMap<EventCategory, u32>,
  pub total_seconds:   i64,
  pub last_used:       Option<DateTime<Utc>>,
  /// Events that ended within seven days of being recorded.
  pub last_week:       u32,
  /// Events that ended within fifteen weeks of being recorded.
  pub last_trimester:  u32,
  pub has_been_called: bool,
}

impl UsageStatistics {
  /// Account for an activity spanning `start..stop`. Inverted ranges are
  /// garbage and are ignored.
  pub fn update(
    &mut self,
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
    category: EventCategory,
    now: DateTime<Utc>,
  ) -> bool {
    if stop < start {
      return false;
    }

    self.touch(start);
    self.total_seconds += (stop - start).num_seconds();
    *self.counts.entry(category).or_default() += 1;

    let age = now - stop;
    if age <= Duration::days(7) {
      self.last_week += 1;
    }
    if age <= Duration::weeks(15) {
      self.last_trimester += 1;
    }
    if category == EventCategory::Call {
      self.has_been_called = true;
    }
    true
  }

  /// Move `last_used` forward. Returns whether it changed.
  pub fn touch(&mut self, at: DateTime<Utc>) -> bool {
    if self.last_used.is_some_and(|t| t >= at) {
      return false;
    }
    self.last_used = Some(at);
    true
  }

  pub fn count(&self, category: EventCategory) -> u32 {
    self.counts.get(&category).copied().unwrap_or_default()
  }

  pub fn call_count(&self) -> u32 { self.count(EventCategory::Call) }

  /// Fold the statistics of a merged duplicate into these.
  pub fn absorb(&mut self, other: &Self) {
    for (category, n) in &other.counts {
      *self.counts.entry(*category).or_default() += n;
    }
    self.total_seconds += other.total_seconds;
    self.last_week += other.last_week;
    self.last_trimester += other.last_trimester;
    self.has_been_called |= other.has_been_called;
    if let Some(t) = other.last_used {
      self.touch(t);
    }
  }
}
