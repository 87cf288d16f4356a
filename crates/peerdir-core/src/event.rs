//! Time-stamped happenings attributed to a contact method.
//!
//! Events are immutable once recorded. The read flag is the only field that
//! changes afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use uuid::Uuid;

use crate::contact_method::ContactMethodId;

pub type EventId = Uuid;

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
#[strum(serialize_all = "snake_case")]
pub enum EventCategory {
  Call,
  Message,
  Snapshot,
  /// Recorded and queryable, but never shown on a timeline.
  DataTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  Incoming,
  Outgoing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
  #[default]
  Completed,
  Missed,
  Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
  pub event_id:       EventId,
  pub category:       EventCategory,
  pub start:          DateTime<Utc>,
  pub stop:           DateTime<Utc>,
  pub direction:      Direction,
  pub status:         EventStatus,
  /// The handle the event was recorded against. It may since have become a
  /// duplicate of another contact method.
  pub contact_method: ContactMethodId,
  pub body:           Option<String>,
  pub read:           bool,
  /// Forces the timeline to open a new group at this event.
  pub group_head:     bool,
}

impl Event {
  pub fn is_incoming(&self) -> bool { self.direction == Direction::Incoming }

  pub fn is_missed(&self) -> bool { self.status == EventStatus::Missed }

  pub fn duration_secs(&self) -> i64 {
    (self.stop - self.start).num_seconds().max(0)
  }

  /// A message with nothing to show.
  pub fn is_empty_message(&self) -> bool {
    self.category == EventCategory::Message
      && self.body.as_deref().is_none_or(|b| b.trim().is_empty())
  }
}

/// An event that has not been recorded yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
  pub category:   EventCategory,
  pub start:      DateTime<Utc>,
  pub stop:       DateTime<Utc>,
  pub direction:  Direction,
  #[serde(default)]
  pub status:     EventStatus,
  #[serde(default)]
  pub body:       Option<String>,
  #[serde(default)]
  pub read:       bool,
  #[serde(default)]
  pub group_head: bool,
}

impl NewEvent {
  /// An instantaneous event. Incoming events start unread.
  pub fn new(
    category: EventCategory,
    direction: Direction,
    at: DateTime<Utc>,
  ) -> Self {
    Self {
      category,
      start: at,
      stop: at,
      direction,
      status: EventStatus::Completed,
      body: None,
      read: direction == Direction::Outgoing,
      group_head: false,
    }
  }

  pub fn call(
    direction: Direction,
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
  ) -> Self {
    Self {
      stop,
      read: true,
      ..Self::new(EventCategory::Call, direction, start)
    }
  }

  pub fn message(
    direction: Direction,
    at: DateTime<Utc>,
    body: impl Into<String>,
  ) -> Self {
    Self {
      body: Some(body.into()),
      ..Self::new(EventCategory::Message, direction, at)
    }
  }

  pub fn missed(mut self) -> Self {
    self.status = EventStatus::Missed;
    self.read = self.direction == Direction::Outgoing;
    self
  }

  pub fn group_head(mut self) -> Self {
    self.group_head = true;
    self
  }

  pub(crate) fn record(self, contact_method: ContactMethodId) -> Event {
    Event {
      event_id: Uuid::new_v4(),
      category: self.category,
      start: self.start,
      stop: self.stop,
      direction: self.direction,
      status: self.status,
      contact_method,
      body: self.body,
      read: self.read,
      group_head: self.group_head,
    }
  }
}
