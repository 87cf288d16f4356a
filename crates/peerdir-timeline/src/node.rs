//! Timeline tree nodes.

use chrono::{DateTime, Utc};
use peerdir_core::{ContactMethodId, Event, EventCategory, EventId};
use serde::Serialize;

use crate::time_category::TimeCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) u32);

/// What a conversation group is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
  Calls,
  Texts,
  Snapshots,
}

impl GroupKind {
  /// The group an event category belongs in. `None` for categories the
  /// timeline does not show.
  pub fn of(category: EventCategory) -> Option<Self> {
    match category {
      EventCategory::Call => Some(Self::Calls),
      EventCategory::Message => Some(Self::Texts),
      EventCategory::Snapshot => Some(Self::Snapshots),
      EventCategory::DataTransfer => None,
    }
  }
}

/// Running tallies of a conversation group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
  pub incoming:        u32,
  pub outgoing:        u32,
  pub missed_incoming: u32,
  pub missed_outgoing: u32,
  pub unread:          u32,
}

impl GroupSummary {
  pub(crate) fn count(&mut self, event: &Event) {
    match (event.is_missed(), event.is_incoming()) {
      (false, true) => self.incoming += 1,
      (false, false) => self.outgoing += 1,
      (true, true) => self.missed_incoming += 1,
      (true, false) => self.missed_outgoing += 1,
    }
    if !event.read {
      self.unread += 1;
    }
  }

  pub fn total(&self) -> u32 {
    self.incoming + self.outgoing + self.missed_incoming + self.missed_outgoing
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
  TimeCategory {
    category: TimeCategory,
    /// Leaves anywhere below this node.
    entries:  usize,
  },
  Group {
    group:   GroupKind,
    summary: GroupSummary,
  },
  Leaf {
    event_id:       EventId,
    category:       EventCategory,
    contact_method: ContactMethodId,
    read:           bool,
  },
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
  pub kind:     NodeKind,
  pub parent:   Option<NodeId>,
  pub children: Vec<NodeId>,
  pub start:    DateTime<Utc>,
  pub end:      DateTime<Utc>,
}

impl Node {
  pub(crate) fn new(kind: NodeKind, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
    Self {
      kind,
      parent: None,
      children: Vec::new(),
      start,
      end,
    }
  }

  pub(crate) fn stretch(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
    self.start = self.start.min(start);
    self.end = self.end.max(end);
  }

  pub fn is_leaf(&self) -> bool { matches!(self.kind, NodeKind::Leaf { .. }) }

  pub fn time_category(&self) -> Option<TimeCategory> {
    match self.kind {
      NodeKind::TimeCategory { category, .. } => Some(category),
      _ => None,
    }
  }

  pub fn group(&self) -> Option<(GroupKind, &GroupSummary)> {
    match &self.kind {
      NodeKind::Group { group, summary } => Some((*group, summary)),
      _ => None,
    }
  }

  pub fn event_id(&self) -> Option<EventId> {
    match self.kind {
      NodeKind::Leaf { event_id, .. } => Some(event_id),
      _ => None,
    }
  }
}
