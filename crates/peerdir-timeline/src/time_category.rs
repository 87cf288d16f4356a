//! Coarse age buckets for the top level of a timeline.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// Ordered from the most recent bucket to the oldest.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum TimeCategory {
  Today,
  Yesterday,
  #[strum(serialize = "Two days ago")]
  TwoDays,
  #[strum(serialize = "Three days ago")]
  ThreeDays,
  #[strum(serialize = "Four days ago")]
  FourDays,
  #[strum(serialize = "Five days ago")]
  FiveDays,
  #[strum(serialize = "Six days ago")]
  SixDays,
  #[strum(serialize = "Last week")]
  LastWeek,
  #[strum(serialize = "Two weeks ago")]
  TwoWeeks,
  #[strum(serialize = "Three weeks ago")]
  ThreeWeeks,
  #[strum(serialize = "Last month")]
  LastMonth,
  #[strum(serialize = "Two months ago")]
  TwoMonths,
  #[strum(serialize = "Three months ago")]
  ThreeMonths,
  #[strum(serialize = "Four months ago")]
  FourMonths,
  #[strum(serialize = "Five months ago")]
  FiveMonths,
  #[strum(serialize = "Six months ago")]
  SixMonths,
  #[strum(serialize = "Seven months ago")]
  SevenMonths,
  #[strum(serialize = "Eight months ago")]
  EightMonths,
  #[strum(serialize = "Nine months ago")]
  NineMonths,
  #[strum(serialize = "Ten months ago")]
  TenMonths,
  #[strum(serialize = "Eleven months ago")]
  ElevenMonths,
  #[strum(serialize = "Last year")]
  LastYear,
  #[strum(serialize = "Very long time ago")]
  VeryLongTimeAgo,
  /// Timestamps at or before the epoch: the time was never known.
  Never,
}

impl TimeCategory {
  /// Bucket `at` relative to `now`, by UTC calendar days and months.
  /// Future timestamps count as today.
  pub fn of(at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
    if at.timestamp() <= 0 {
      return Self::Never;
    }

    let days = (now.date_naive() - at.date_naive()).num_days();
    match days {
      i64::MIN..=0 => return Self::Today,
      1 => return Self::Yesterday,
      2 => return Self::TwoDays,
      3 => return Self::ThreeDays,
      4 => return Self::FourDays,
      5 => return Self::FiveDays,
      6 => return Self::SixDays,
      7..=13 => return Self::LastWeek,
      14..=20 => return Self::TwoWeeks,
      21..=27 => return Self::ThreeWeeks,
      _ => {}
    }

    let months = (now.year() * 12 + now.month0() as i32)
      - (at.year() * 12 + at.month0() as i32);
    match months {
      i32::MIN..=1 => Self::LastMonth,
      2 => Self::TwoMonths,
      3 => Self::ThreeMonths,
      4 => Self::FourMonths,
      5 => Self::FiveMonths,
      6 => Self::SixMonths,
      7 => Self::SevenMonths,
      8 => Self::EightMonths,
      9 => Self::NineMonths,
      10 => Self::TenMonths,
      11 => Self::ElevenMonths,
      12..=23 => Self::LastYear,
      _ => Self::VeryLongTimeAgo,
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use strum::IntoEnumIterator;

  use super::*;

  fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap() }

  #[test]
  fn calendar_days() {
    let now = now();
    assert_eq!(TimeCategory::of(now, now), TimeCategory::Today);
    assert_eq!(
      TimeCategory::of(Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 1).unwrap(), now),
      TimeCategory::Today
    );
    assert_eq!(
      TimeCategory::of(Utc.with_ymd_and_hms(2024, 6, 14, 23, 59, 0).unwrap(), now),
      TimeCategory::Yesterday
    );
    assert_eq!(
      TimeCategory::of(now - Duration::days(3), now),
      TimeCategory::ThreeDays
    );
    assert_eq!(
      TimeCategory::of(now - Duration::days(10), now),
      TimeCategory::LastWeek
    );
    assert_eq!(
      TimeCategory::of(now - Duration::days(25), now),
      TimeCategory::ThreeWeeks
    );
    assert_eq!(TimeCategory::of(now + Duration::hours(30), now), TimeCategory::Today);
  }

  #[test]
  fn calendar_months_and_years() {
    let now = now();
    assert_eq!(
      TimeCategory::of(Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap(), now),
      TimeCategory::LastMonth
    );
    assert_eq!(
      TimeCategory::of(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(), now),
      TimeCategory::ThreeMonths
    );
    assert_eq!(
      TimeCategory::of(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(), now),
      TimeCategory::LastYear
    );
    assert_eq!(
      TimeCategory::of(Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap(), now),
      TimeCategory::VeryLongTimeAgo
    );
    assert_eq!(
      TimeCategory::of(Utc.timestamp_opt(0, 0).unwrap(), now),
      TimeCategory::Never
    );
  }

  #[test]
  fn labels() {
    assert_eq!(TimeCategory::TwoDays.to_string(), "Two days ago");
    assert_eq!(TimeCategory::Today.to_string(), "Today");
    assert_eq!(TimeCategory::iter().count(), 24);
  }
}
