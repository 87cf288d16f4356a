//! Merging contact methods that turned out to be the same endpoint.

use std::collections::HashMap;

use tracing::{debug, error, warn};

use super::Directory;
use crate::{
  Result,
  contact_method::{AlternativeHistory, ContactMethodId, ContactMethodKind},
  event::{Event, EventCategory, EventId},
  notification::Notification,
  person::PersonId,
};

impl Directory {
  /// Fold `other` into `into`. `into`'s backing record survives and `other`
  /// becomes a duplicate that delegates to it.
  ///
  /// Returns `false`, changing nothing, when the two are already one record,
  /// when either is temporary or the blank placeholder, or when their
  /// accounts disagree. Persons must agree too, counting the persons of the
  /// individuals each side belongs to.
  pub fn merge(&mut self, into: ContactMethodId, other: ContactMethodId) -> bool {
    match self.try_merge(into, other) {
      Ok(merged) => merged,
      Err(error) => {
        warn!(%into, %other, %error, "merge failed");
        false
      }
    }
  }

  fn try_merge(
    &mut self,
    into: ContactMethodId,
    other: ContactMethodId,
  ) -> Result<bool> {
    let keep = self.backing_id(into)?;
    let lose = self.backing_id(other)?;
    if keep == lose {
      return Ok(false);
    }

    let survivor = self.backing(into)?;
    let loser = self.backing(other)?;

    if !is_mergeable(survivor.kind) || !is_mergeable(loser.kind) {
      return Ok(false);
    }
    if let (Some(a), Some(b)) = (&survivor.account, &loser.account)
      && a != b
    {
      debug!(%into, %other, "not merging contact methods of different accounts");
      return Ok(false);
    }

    // Both endpoints and both of their individuals must agree on one person.
    let persons: Vec<PersonId> = [survivor.person, loser.person]
      .into_iter()
      .chain(
        [survivor.individual.upgrade(), loser.individual.upgrade()]
          .into_iter()
          .flatten()
          .map(|i| i.person()),
      )
      .flatten()
      .collect();
    if persons.windows(2).any(|pair| pair[0] != pair[1]) {
      warn!(%into, %other, ?persons, "refusing to merge contact methods of different persons");
      return Ok(false);
    }

    let Some(loser) = self.take_backing(lose) else {
      return Ok(false);
    };
    for parent in &loser.parents {
      self.repoint(*parent, keep);
    }

    let Some(survivor) = self.backing_by_id_mut(keep) else {
      return Ok(false);
    };

    survivor.tracked |= loser.tracked;
    survivor.present |= loser.present;
    survivor.bookmarked |= loser.bookmarked;
    if survivor.presence_message.is_none() {
      survivor.presence_message = loser.presence_message.clone();
    }
    if survivor.account.is_none() {
      survivor.account = loser.account.clone();
    }
    if survivor.category.is_none() {
      survivor.category = loser.category.clone();
    }
    if survivor.registered_name.is_none() {
      survivor.registered_name = loser.registered_name.clone();
    }
    let gained_person = survivor.person.is_none() && loser.person.is_some();
    if gained_person {
      survivor.person = loser.person;
    }
    for (name, count) in &loser.alternative_names {
      *survivor.alternative_names.entry(name.clone()).or_default() += count;
    }
    survivor.stats.absorb(&loser.stats);

    survivor.kind = match (survivor.kind, loser.kind) {
      (ContactMethodKind::Account, _) | (_, ContactMethodKind::Account) => {
        ContactMethodKind::Account
      }
      (ContactMethodKind::Used, _) | (_, ContactMethodKind::Used) => {
        ContactMethodKind::Used
      }
      (kind, _) => kind,
    };

    // Calls follow the endpoint. Text history is kept apart so it stays
    // attributable to the spelling it was exchanged under.
    let (texts, calls): (Vec<_>, Vec<_>) =
      loser.events.iter().copied().partition(|id| {
        is_text_event(&self.events, &self.event_index, *id)
      });
    let Some(survivor) = self.backing_by_id_mut(keep) else {
      return Ok(false);
    };
    survivor.events.extend(calls);
    if !texts.is_empty() {
      survivor.alternative_histories.push(AlternativeHistory {
        origin: other,
        uri:    loser.uri.clone(),
        events: texts,
      });
    }
    survivor
      .alternative_histories
      .extend(loser.alternative_histories.iter().cloned());

    let (primary, alternate) = if loser.uri.specificity() > survivor.uri.specificity() {
      (loser.uri.clone(), std::mem::replace(&mut survivor.uri, loser.uri.clone()))
    } else {
      (survivor.uri.clone(), loser.uri.clone())
    };
    for uri in std::iter::once(alternate).chain(loser.other_uris.iter().cloned()) {
      if uri != primary && !survivor.other_uris.contains(&uri) {
        survivor.other_uris.push(uri);
      }
    }

    survivor.parents.extend(loser.parents.iter().copied());

    let kept_individual = survivor.individual.upgrade();
    let lost_individual = loser.individual.upgrade();
    let person = survivor.person;

    match (kept_individual, lost_individual) {
      (None, Some(individual)) => {
        if let Some(survivor) = self.backing_by_id_mut(keep) {
          survivor.individual = individual.downgrade();
        }
        self.dedupe_individual(&individual);
      }
      (Some(kept), Some(lost)) if !kept.ptr_eq(&lost) => {
        match self.merge_individuals(&kept, &lost) {
          Ok(survivor) => self.dedupe_individual(&survivor),
          Err(e) => {
            // The endpoint now belongs to `kept` only.
            error!(%into, %other, error = %e, "individuals left unmerged");
            lost.with_mut(|d| {
              d.numbers.retain(|cm| !loser.parents.contains(cm));
              d.related.retain(|cm| !loser.parents.contains(cm));
            });
            self.dedupe_individual(&kept);
          }
        }
      }
      (Some(kept), _) => self.dedupe_individual(&kept),
      (None, None) => {}
    }

    if gained_person && let Some(uid) = person {
      self.notify(Notification::ContactChanged {
        contact_method: into,
        previous:       None,
        current:        Some(uid),
      });
      self.join_person_individual(into, uid)?;
    }

    debug!(%into, %other, "merged contact methods");
    self.notify(Notification::Rebased {
      duplicate: other,
      canonical: into,
    });
    self.notify(Notification::ContactMethodChanged {
      contact_method: into,
    });
    Ok(true)
  }
}

fn is_mergeable(kind: ContactMethodKind) -> bool {
  !matches!(kind, ContactMethodKind::Temporary | ContactMethodKind::Blank)
}

fn is_text_event(
  events: &[Event],
  index: &HashMap<EventId, usize>,
  id: EventId,
) -> bool {
  index
    .get(&id)
    .and_then(|i| events.get(*i))
    .is_some_and(|e| {
      matches!(e.category, EventCategory::Message | EventCategory::Snapshot)
    })
}
