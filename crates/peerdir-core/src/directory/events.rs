//! The event log.

use std::collections::HashSet;

use tracing::debug;

use super::Directory;
use crate::{
  Error,
  Result,
  contact_method::{ContactMethodId, ContactMethodKind},
  event::{Event, EventCategory, EventId, NewEvent},
  individual::Individual,
  notification::Notification,
};

impl Directory {
  /// Record an event against `cm`, updating its statistics and its
  /// individual's last-used contact method.
  pub fn add_event(&mut self, cm: ContactMethodId, event: NewEvent) -> Result<EventId> {
    let now = self.now();
    let event = event.record(cm);
    let event_id = event.event_id;

    let backing = self.backing_mut(cm)?;
    if backing.kind == ContactMethodKind::Blank {
      return Err(Error::BlankContactMethod(cm));
    }
    if !backing.stats.update(event.start, event.stop, event.category, now) {
      debug!(%cm, %event_id, "event ends before it starts; statistics unchanged");
    }
    if backing.kind == ContactMethodKind::Unused {
      backing.kind = ContactMethodKind::Used;
    }
    backing.events.push(event_id);
    let last_used = backing.stats.last_used;
    if let (Some(individual), Some(at)) = (backing.individual.upgrade(), last_used) {
      individual.with_mut(|d| d.touch(cm, at));
    }

    self.event_index.insert(event_id, self.events.len());
    self.events.push(event);

    self.notify(Notification::EventAdded {
      event_id,
      contact_method: cm,
    });
    self.notify(Notification::ContactMethodChanged { contact_method: cm });
    Ok(event_id)
  }

  pub fn event(&self, id: EventId) -> Option<&Event> {
    self.event_index.get(&id).and_then(|i| self.events.get(*i))
  }

  /// Every event, in recording order.
  pub fn events(&self) -> &[Event] { &self.events }

  pub fn set_event_read(&mut self, id: EventId, read: bool) -> Result<bool> {
    let index = *self.event_index.get(&id).ok_or(Error::UnknownEvent(id))?;
    let Some(event) = self.events.get_mut(index) else {
      return Err(Error::UnknownEvent(id));
    };
    if event.read == read {
      return Ok(false);
    }
    event.read = read;
    self.notify(Notification::EventChanged { event_id: id });
    Ok(true)
  }

  /// Events of `cm`'s endpoint, including text history inherited from
  /// merged duplicates, sorted by start time.
  pub fn events_for_contact_method(&self, cm: ContactMethodId) -> Result<Vec<&Event>> {
    let backing = self.backing(cm)?;
    let mut events: Vec<&Event> = backing
      .events
      .iter()
      .chain(backing.alternative_histories.iter().flat_map(|h| h.events.iter()))
      .filter_map(|id| self.event(*id))
      .collect();
    events.sort_by_key(|e| (e.start, e.event_id));
    Ok(events)
  }

  /// Events across every visible and hidden contact method of an
  /// individual, sorted by start time. Shared endpoints count once.
  pub fn events_for_individual(&self, individual: &Individual) -> Vec<&Event> {
    let mut seen = HashSet::new();
    let mut events = Vec::new();
    for cm in individual.all_contact_methods() {
      let Ok(backing) = self.backing_id(cm) else {
        continue;
      };
      if !seen.insert(backing) {
        continue;
      }
      if let Ok(found) = self.events_for_contact_method(cm) {
        events.extend(found);
      }
    }
    events.sort_by_key(|e| (e.start, e.event_id));
    events
  }

  /// Distinct backing records of an individual, through canonical handles.
  fn distinct_contact_methods(&self, individual: &Individual) -> Vec<ContactMethodId> {
    let mut seen = HashSet::new();
    individual
      .all_contact_methods()
      .into_iter()
      .filter(|cm| self.backing_id(*cm).is_ok_and(|b| seen.insert(b)))
      .collect()
  }

  pub fn call_count(&self, individual: &Individual) -> u32 {
    self
      .distinct_contact_methods(individual)
      .into_iter()
      .filter_map(|cm| self.backing(cm).ok())
      .map(|b| b.stats.call_count())
      .sum()
  }

  /// Seconds spent in calls and other timed activity.
  pub fn total_seconds(&self, individual: &Individual) -> i64 {
    self
      .distinct_contact_methods(individual)
      .into_iter()
      .filter_map(|cm| self.backing(cm).ok())
      .map(|b| b.stats.total_seconds)
      .sum()
  }

  pub fn unread_count(&self, individual: &Individual) -> usize {
    self
      .events_for_individual(individual)
      .into_iter()
      .filter(|e| !e.read && e.category == EventCategory::Message)
      .count()
  }

  /// Mark every message of an individual read. Returns how many changed.
  pub fn mark_as_read(&mut self, individual: &Individual) -> Result<usize> {
    let unread: Vec<EventId> = self
      .events_for_individual(individual)
      .into_iter()
      .filter(|e| !e.read)
      .map(|e| e.event_id)
      .collect();
    let mut changed = 0;
    for id in unread {
      if self.set_event_read(id, true)? {
        changed += 1;
      }
    }
    Ok(changed)
  }
}
