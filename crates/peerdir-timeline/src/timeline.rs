//! A grouped, time-ordered view of everything that happened with one peer.
//!
//! The tree has three levels: time categories at the root, conversation
//! groups below them, and one leaf per event. Siblings are always in
//! ascending start order. Inserting is a sorted insert with a fast path for
//! the newest item, which is the common case for live events.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use peerdir_core::{
  ContactMethodId,
  Directory,
  Event,
  EventId,
  Individual,
  Notification,
  PersonId,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
  node::{GroupKind, GroupSummary, Node, NodeId, NodeKind},
  time_category::TimeCategory,
};

/// Whose history a timeline shows.
#[derive(Debug, Clone)]
pub enum TimelineSource {
  Individual(Individual),
  ContactMethod(ContactMethodId),
}

/// Maximum silence inside one conversation group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grouping {
  pub call_gap_secs:    i64,
  pub message_gap_secs: i64,
}

impl Default for Grouping {
  fn default() -> Self {
    Self {
      call_gap_secs:    3600,
      message_gap_secs: 1200,
    }
  }
}

impl Grouping {
  fn gap(&self, kind: GroupKind) -> Duration {
    match kind {
      GroupKind::Calls => Duration::seconds(self.call_gap_secs),
      GroupKind::Texts | GroupKind::Snapshots => {
        Duration::seconds(self.message_gap_secs)
      }
    }
  }
}

/// Structural changes, for a presentation layer mirroring the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineChange {
  Inserted {
    node:   NodeId,
    parent: Option<NodeId>,
    row:    usize,
  },
  Changed {
    node: NodeId,
  },
  /// Everything changed; re-read the whole tree.
  Reset,
}

pub struct Timeline {
  source:      TimelineSource,
  grouping:    Grouping,
  nodes:       Vec<Option<Node>>,
  /// Vacated arena slots, reused before the arena grows.
  free:        Vec<NodeId>,
  roots:       Vec<NodeId>,
  categories:  HashMap<TimeCategory, NodeId>,
  leaves:      HashMap<EventId, NodeId>,
  identity:    Option<PersonId>,
  now:         DateTime<Utc>,
  changes:     Vec<TimelineChange>,
  initialized: bool,
}

impl Timeline {
  pub fn new(source: TimelineSource, grouping: Grouping) -> Self {
    Self {
      source,
      grouping,
      nodes: Vec::new(),
      free: Vec::new(),
      roots: Vec::new(),
      categories: HashMap::new(),
      leaves: HashMap::new(),
      identity: None,
      now: DateTime::<Utc>::MIN_UTC,
      changes: Vec::new(),
      initialized: false,
    }
  }

  pub fn source(&self) -> &TimelineSource { &self.source }

  pub fn is_initialized(&self) -> bool { self.initialized }

  /// The reference time categories were last computed against.
  pub fn now(&self) -> DateTime<Utc> { self.now }

  // ─── Lifecycle ───────────────────────────────────────────────────────────

  /// Backfill every existing event of the source.
  pub fn init(&mut self, dir: &Directory, now: DateTime<Utc>) {
    self.now = now;
    self.identity = self.current_identity(dir);
    for event in self.source_events(dir) {
      self.insert_event(event);
    }
    self.initialized = true;
    self.changes.clear();
    self.changes.push(TimelineChange::Reset);
  }

  /// Tear the tree down and build it again from the directory.
  pub fn reload(&mut self, dir: &Directory) {
    debug!("reloading timeline");
    let now = self.now;
    self.clear();
    self.init(dir, now);
  }

  /// Drop every node. The timeline ignores notifications until the next
  /// [`init`](Self::init).
  pub fn clear(&mut self) {
    self.nodes.clear();
    self.free.clear();
    self.roots.clear();
    self.categories.clear();
    self.leaves.clear();
    self.initialized = false;
    self.changes.clear();
    self.changes.push(TimelineChange::Reset);
  }

  /// Re-home every group into the category its age now falls in. Group and
  /// leaf subtrees are kept as they are. Returns whether anything moved.
  pub fn rebucket(&mut self, now: DateTime<Utc>) -> bool {
    self.now = now;

    let placed: Vec<(NodeId, TimeCategory)> = self
      .roots
      .iter()
      .filter_map(|root| {
        let node = self.node(*root)?;
        let category = node.time_category()?;
        Some(node.children.iter().map(move |g| (*g, category)))
      })
      .flatten()
      .collect();

    let moved = placed
      .iter()
      .any(|(group, category)| TimeCategory::of(self.start_of(*group), now) != *category);
    if !moved {
      return false;
    }

    for root in std::mem::take(&mut self.roots) {
      if let Some(slot) = self.nodes.get_mut(root.0 as usize) {
        *slot = None;
        self.free.push(root);
      }
    }
    self.categories.clear();

    for (group, _) in placed {
      let Some(node) = self.node(group) else {
        continue;
      };
      let (start, end, entries) = (node.start, node.end, node.children.len());
      let category = self.category_node(TimeCategory::of(start, now), start);
      self.insert_child(Some(category), group);
      if let Some(node) = self.node_mut(category) {
        node.stretch(start, end);
        if let NodeKind::TimeCategory { entries: total, .. } = &mut node.kind {
          *total += entries;
        }
      }
    }

    self.changes.clear();
    self.changes.push(TimelineChange::Reset);
    true
  }

  /// React to a directory notification. Returns whether the tree changed.
  pub fn apply(&mut self, dir: &Directory, notification: &Notification) -> bool {
    if !self.initialized {
      return false;
    }

    match notification {
      Notification::EventAdded {
        event_id,
        contact_method,
      } => {
        if !self.covers(dir, *contact_method) {
          return false;
        }
        dir
          .event(*event_id)
          .is_some_and(|event| self.insert_event(event).is_some())
      }
      Notification::EventChanged { event_id } => self.refresh_read(dir, *event_id),
      Notification::Rebased {
        duplicate,
        canonical,
      } => {
        if !(self.covers(dir, *duplicate) || self.covers(dir, *canonical)) {
          return false;
        }
        self.reload_if_stale(dir)
      }
      Notification::ContactChanged { contact_method, .. } => {
        if !self.covers(dir, *contact_method)
          || self.current_identity(dir) == self.identity
        {
          return false;
        }
        self.reload(dir);
        true
      }
      Notification::PhoneNumbersChanged { individual } => {
        if !self.is_individual(*individual) {
          return false;
        }
        let mut inserted = false;
        for event in self.source_events(dir) {
          inserted |= self.insert_event(event).is_some();
        }
        inserted
      }
      Notification::IndividualsMerged { survivor, .. } => {
        self.is_individual(*survivor) && self.reload_if_stale(dir)
      }
      _ => false,
    }
  }

  /// Full reload when the identity changed or events arrived that the
  /// incremental path never saw. A merge that changes neither is a no-op.
  fn reload_if_stale(&mut self, dir: &Directory) -> bool {
    let stale = self.current_identity(dir) != self.identity
      || self
        .source_events(dir)
        .iter()
        .any(|e| is_shown(e) && !self.leaves.contains_key(&e.event_id));
    if stale {
      self.reload(dir);
    }
    stale
  }

  // ─── Insertion ───────────────────────────────────────────────────────────

  /// Insert one event. Returns the new leaf, or `None` when the event is
  /// already shown or is not shown on timelines at all.
  pub fn insert_event(&mut self, event: &Event) -> Option<NodeId> {
    if self.leaves.contains_key(&event.event_id) {
      return None;
    }
    let Some(kind) = GroupKind::of(event.category) else {
      debug!(event_id = %event.event_id, category = %event.category, "not shown on timelines");
      return None;
    };
    if event.is_empty_message() {
      return None;
    }

    let start = event.start;
    let end = event.stop.max(event.start);

    let category = self.category_node(TimeCategory::of(start, self.now), start);
    let group = self.group_for(category, kind, event);

    let leaf = self.alloc(Node::new(
      NodeKind::Leaf {
        event_id:       event.event_id,
        category:       event.category,
        contact_method: event.contact_method,
        read:           event.read,
      },
      start,
      end,
    ));
    self.insert_child(Some(group), leaf);
    self.leaves.insert(event.event_id, leaf);

    if let Some(node) = self.node_mut(group) {
      node.stretch(start, end);
      if let NodeKind::Group { summary, .. } = &mut node.kind {
        summary.count(event);
      }
    }
    if let Some(node) = self.node_mut(category) {
      node.stretch(start, end);
      if let NodeKind::TimeCategory { entries, .. } = &mut node.kind {
        *entries += 1;
      }
    }
    self.changes.push(TimelineChange::Changed { node: group });
    self.changes.push(TimelineChange::Changed { node: category });
    Some(leaf)
  }

  fn category_node(&mut self, category: TimeCategory, start: DateTime<Utc>) -> NodeId {
    if let Some(node) = self.categories.get(&category) {
      return *node;
    }
    let node = self.alloc(Node::new(
      NodeKind::TimeCategory {
        category,
        entries: 0,
      },
      start,
      start,
    ));
    self.insert_child(None, node);
    self.categories.insert(category, node);
    node
  }

  /// The group preceding the event joins it when it is of the same kind,
  /// recent enough, and the event does not force a new group.
  fn group_for(&mut self, category: NodeId, kind: GroupKind, event: &Event) -> NodeId {
    let siblings = self.children(category);
    let pos = siblings.partition_point(|c| self.start_of(*c) <= event.start);

    if !event.group_head
      && pos > 0
      && let Some(candidate) = self.node(siblings[pos - 1])
      && let Some((group, _)) = candidate.group()
      && group == kind
      && event.start - candidate.end <= self.grouping.gap(kind)
    {
      return siblings[pos - 1];
    }

    let group = self.alloc(Node::new(
      NodeKind::Group {
        group:   kind,
        summary: GroupSummary::default(),
      },
      event.start,
      event.start,
    ));
    self.insert_child(Some(category), group);
    group
  }

  fn insert_child(&mut self, parent: Option<NodeId>, child: NodeId) {
    let start = self.start_of(child);
    let siblings = match parent {
      Some(parent) => self.children(parent),
      None => &self.roots,
    };
    let row = match siblings.last() {
      Some(last) if self.start_of(*last) > start => {
        siblings.partition_point(|c| self.start_of(*c) <= start)
      }
      _ => siblings.len(),
    };

    match parent {
      Some(parent) => {
        if let Some(node) = self.node_mut(parent) {
          node.children.insert(row, child);
        }
      }
      None => self.roots.insert(row, child),
    }
    if let Some(node) = self.node_mut(child) {
      node.parent = parent;
    }
    self.changes.push(TimelineChange::Inserted {
      node: child,
      parent,
      row,
    });
  }

  fn refresh_read(&mut self, dir: &Directory, event_id: EventId) -> bool {
    let (Some(leaf), Some(event)) = (self.leaves.get(&event_id).copied(), dir.event(event_id))
    else {
      return false;
    };
    let Some(node) = self.node_mut(leaf) else {
      return false;
    };
    let NodeKind::Leaf { read, .. } = &mut node.kind else {
      return false;
    };
    if *read == event.read {
      return false;
    }
    *read = event.read;
    let parent = node.parent;

    if let Some(group) = parent
      && let Some(node) = self.node_mut(group)
      && let NodeKind::Group { summary, .. } = &mut node.kind
    {
      if event.read {
        summary.unread = summary.unread.saturating_sub(1);
      } else {
        summary.unread += 1;
      }
      self.changes.push(TimelineChange::Changed { node: group });
    }
    self.changes.push(TimelineChange::Changed { node: leaf });
    true
  }

  // ─── Source ──────────────────────────────────────────────────────────────

  fn source_events<'d>(&self, dir: &'d Directory) -> Vec<&'d Event> {
    match &self.source {
      TimelineSource::Individual(individual) => dir.events_for_individual(individual),
      TimelineSource::ContactMethod(cm) => {
        dir.events_for_contact_method(*cm).unwrap_or_default()
      }
    }
  }

  fn current_identity(&self, dir: &Directory) -> Option<PersonId> {
    match &self.source {
      TimelineSource::Individual(individual) => individual.person(),
      TimelineSource::ContactMethod(cm) => {
        dir.contact_method(*cm).ok().and_then(|c| c.person())
      }
    }
  }

  /// Whether events of `cm` belong on this timeline.
  pub fn covers(&self, dir: &Directory, cm: ContactMethodId) -> bool {
    match &self.source {
      TimelineSource::Individual(individual) => individual
        .all_contact_methods()
        .iter()
        .any(|c| dir.same_endpoint(*c, cm)),
      TimelineSource::ContactMethod(source) => dir.same_endpoint(*source, cm),
    }
  }

  fn is_individual(&self, id: Uuid) -> bool {
    matches!(&self.source, TimelineSource::Individual(i) if i.id() == id)
  }

  // ─── Traversal ───────────────────────────────────────────────────────────

  fn alloc(&mut self, node: Node) -> NodeId {
    if let Some(id) = self.free.pop() {
      self.nodes[id.0 as usize] = Some(node);
      return id;
    }
    let id = NodeId(self.nodes.len() as u32);
    self.nodes.push(Some(node));
    id
  }

  /// Slots in the node arena, live or vacated.
  pub fn arena_len(&self) -> usize { self.nodes.len() }

  pub fn node(&self, id: NodeId) -> Option<&Node> {
    self.nodes.get(id.0 as usize).and_then(Option::as_ref)
  }

  fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
    self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut)
  }

  fn start_of(&self, id: NodeId) -> DateTime<Utc> {
    self.node(id).map_or(DateTime::<Utc>::MIN_UTC, |n| n.start)
  }

  /// Time categories, oldest first.
  pub fn roots(&self) -> &[NodeId] { &self.roots }

  pub fn children(&self, id: NodeId) -> &[NodeId] {
    self.node(id).map(|n| n.children.as_slice()).unwrap_or_default()
  }

  pub fn category(&self, category: TimeCategory) -> Option<NodeId> {
    self.categories.get(&category).copied()
  }

  pub fn leaf_for(&self, event_id: EventId) -> Option<NodeId> {
    self.leaves.get(&event_id).copied()
  }

  pub fn leaf_count(&self) -> usize { self.leaves.len() }

  /// Sum of the entry counters of every time category.
  pub fn total_entries(&self) -> usize {
    self
      .roots
      .iter()
      .filter_map(|r| match self.node(*r)?.kind {
        NodeKind::TimeCategory { entries, .. } => Some(entries),
        _ => None,
      })
      .sum()
  }

  /// Every node in display order: each parent before its children.
  pub fn walk(&self) -> Vec<NodeId> {
    let mut out = Vec::with_capacity(self.nodes.len());
    let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
      out.push(id);
      stack.extend(self.children(id).iter().rev());
    }
    out
  }

  pub fn take_changes(&mut self) -> Vec<TimelineChange> {
    std::mem::take(&mut self.changes)
  }
}

fn is_shown(event: &Event) -> bool {
  GroupKind::of(event.category).is_some() && !event.is_empty_message()
}
