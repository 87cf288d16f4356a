//! Recently contacted peers, most recent first.

use chrono::{DateTime, Utc};
use peerdir_core::{ContactMethodId, ContactMethodKind, Directory, Notification};

#[derive(Debug, Default)]
pub struct PeersTimeline {
  entries:     Vec<(ContactMethodId, DateTime<Utc>)>,
  initialized: bool,
}

impl PeersTimeline {
  pub fn new() -> Self { Self::default() }

  pub fn init(&mut self, dir: &Directory) {
    self.entries = dir
      .contact_methods()
      .filter(|cm| is_peer(cm.kind()))
      .filter_map(|cm| Some((cm.id(), cm.last_used()?)))
      .collect();
    self.entries.sort_by(|a, b| b.1.cmp(&a.1));
    self.initialized = true;
  }

  /// Returns whether the list changed.
  pub fn apply(&mut self, dir: &Directory, notification: &Notification) -> bool {
    if !self.initialized {
      return false;
    }
    match notification {
      Notification::EventAdded { contact_method, .. } => {
        let Ok(cm) = dir.contact_method(*contact_method) else {
          return false;
        };
        let (Some(at), true) = (cm.last_used(), is_peer(cm.kind())) else {
          return false;
        };
        let id = cm.canonical();
        self
          .entries
          .retain(|(other, _)| !dir.same_endpoint(*other, id));
        let row = self.entries.partition_point(|(_, t)| *t > at);
        self.entries.insert(row, (id, at));
        true
      }
      Notification::Rebased { canonical, .. } => {
        let before = self.entries.len();
        let mut seen: Vec<ContactMethodId> = Vec::new();
        self.entries.retain(|(cm, _)| {
          if seen.iter().any(|s| dir.same_endpoint(*s, *cm)) {
            return false;
          }
          seen.push(*cm);
          true
        });
        // The surviving entry carries the newest activity of both sides.
        if let Ok(cm) = dir.contact_method(*canonical)
          && let Some(at) = cm.last_used()
          && let Some(row) =
            self.entries.iter().position(|(e, _)| dir.same_endpoint(*e, *canonical))
        {
          self.entries.remove(row);
          let row = self.entries.partition_point(|(_, t)| *t > at);
          self.entries.insert(row, (cm.canonical(), at));
        }
        self.entries.len() != before
      }
      _ => false,
    }
  }

  pub fn entries(&self) -> impl Iterator<Item = ContactMethodId> + '_ {
    self.entries.iter().map(|(cm, _)| *cm)
  }

  pub fn most_recent(&self) -> Option<ContactMethodId> {
    self.entries.first().map(|(cm, _)| *cm)
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

fn is_peer(kind: ContactMethodKind) -> bool {
  matches!(kind, ContactMethodKind::Used | ContactMethodKind::Unused)
}
