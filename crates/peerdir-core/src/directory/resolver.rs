//! Grouping contact methods into individuals.

use std::collections::HashSet;

use tracing::{error, warn};

use super::Directory;
use crate::{
  Error,
  Result,
  contact_method::{ContactMethodId, ContactMethodKind},
  individual::Individual,
  notification::Notification,
  person::PersonId,
};

impl Directory {
  // ─── Lookup ──────────────────────────────────────────────────────────────

  /// The individual `cm` belongs to, if any is alive. Never creates one.
  pub fn individual_of(&self, cm: ContactMethodId) -> Option<Individual> {
    self.backing(cm).ok().and_then(|b| b.individual.upgrade())
  }

  /// The individual for `cm`: its current one, else its person's, else a new
  /// individual holding just `cm`.
  pub fn individual_for_contact_method(
    &mut self,
    cm: ContactMethodId,
  ) -> Result<Individual> {
    let backing = self.backing(cm)?;
    if let Some(individual) = backing.individual.upgrade() {
      return Ok(individual);
    }
    if let Some(uid) = backing.person {
      self.individual_for_person(uid)?;
      return self.join_person_individual(cm, uid);
    }

    let individual = Individual::new(None);
    self.attach(&individual, cm, true)
  }

  /// The individual for a person. Created once and kept alive by the person.
  pub fn individual_for_person(&mut self, uid: PersonId) -> Result<Individual> {
    let record = self.persons.get_mut(&uid).ok_or(Error::UnknownPerson(uid))?;
    if let Some(individual) = &record.individual {
      return Ok(individual.clone());
    }
    let individual = Individual::new(Some(uid));
    record.individual = Some(individual.clone());

    let bound: Vec<ContactMethodId> = self
      .backings
      .iter()
      .flatten()
      .filter(|b| b.person == Some(uid) && !b.kind.is_temporary())
      .filter_map(|b| b.parents.first().copied())
      .collect();
    for cm in bound {
      self.attach(&individual, cm, true)?;
    }
    Ok(individual)
  }

  /// One individual for a set of contact methods known to belong together.
  ///
  /// Inputs already spread over several individuals or persons are a caller
  /// bug and are rejected rather than guessed at.
  pub fn individual_for_contact_methods(
    &mut self,
    cms: &[ContactMethodId],
  ) -> Result<Individual> {
    let Some(first) = cms.first().copied() else {
      return Err(Error::EmptyContactMethodSet);
    };

    let mut individuals: Vec<Individual> = Vec::new();
    let mut persons: Vec<PersonId> = Vec::new();
    for cm in cms {
      let backing = self.backing(*cm)?;
      if let Some(individual) = backing.individual.upgrade()
        && !individuals.iter().any(|i| i.ptr_eq(&individual))
      {
        individuals.push(individual);
      }
      if let Some(uid) = backing.person
        && !persons.contains(&uid)
      {
        persons.push(uid);
      }
    }

    if individuals.len() > 1 {
      error!(count = individuals.len(), "contact methods span several individuals");
      return Err(Error::ConflictingIndividuals(individuals.len()));
    }
    if persons.len() > 1 {
      error!(count = persons.len(), "contact methods span several persons");
      return Err(Error::ConflictingPersons(persons.len()));
    }

    let individual = match (individuals.pop(), persons.first().copied()) {
      (Some(individual), Some(uid)) => {
        match (individual.person(), self.persons.get(&uid).and_then(|r| r.individual.clone())) {
          (Some(bound), _) if bound != uid => {
            error!(%bound, %uid, "individual bound to another person");
            return Err(Error::ConflictingPersons(2));
          }
          (_, Some(existing)) if !existing.ptr_eq(&individual) => {
            error!(%uid, "person already has another individual");
            return Err(Error::ConflictingIndividuals(2));
          }
          _ => {
            self.bind_individual_to_person(&individual, uid);
            individual
          }
        }
      }
      (Some(individual), None) => individual,
      (None, Some(uid)) => self.individual_for_person(uid)?,
      (None, None) => self.individual_for_contact_method(first)?,
    };

    for cm in cms {
      if self.backing(*cm)?.individual.upgrade().is_none() {
        self.attach(&individual, *cm, true)?;
      }
    }
    Ok(individual)
  }

  // ─── Membership ──────────────────────────────────────────────────────────

  /// Add `cm` to the visible numbers of `individual`.
  ///
  /// Temporaries are committed first; the committed handle is returned.
  pub fn add_phone_number(
    &mut self,
    individual: &Individual,
    cm: ContactMethodId,
  ) -> Result<ContactMethodId> {
    let cm = self.admit(cm)?;

    let present =
      individual.with(|d| d.numbers.iter().any(|n| self.same_endpoint(*n, cm)));
    if present {
      warn!(%cm, individual = %individual.id(), "contact method already added");
      return Ok(cm);
    }

    let bound = self.adopt_person(individual, cm)?;
    let individual = self.attach(individual, cm, true)?;
    if let Some(uid) = bound {
      self.join_person_individual(cm, uid)?;
    }
    self.notify(Notification::PhoneNumbersChanged {
      individual: individual.id(),
    });
    Ok(cm)
  }

  /// Move `cm` from the visible numbers to the hidden list. Its history
  /// stays with the individual.
  pub fn remove_phone_number(
    &mut self,
    individual: &Individual,
    cm: ContactMethodId,
  ) -> Result<bool> {
    self.backing(cm)?;
    let removed = individual.with_mut(|d| {
      let Some(pos) = d.numbers.iter().position(|n| self.same_endpoint(*n, cm))
      else {
        return false;
      };
      let removed = d.numbers.remove(pos);
      if !d.related.contains(&removed) {
        d.related.push(removed);
      }
      true
    });
    if removed {
      self.notify(Notification::PhoneNumbersChanged {
        individual: individual.id(),
      });
    }
    Ok(removed)
  }

  /// Swap `old` for `new` at the same position. `old` stays attached as a
  /// hidden contact method so the timeline keeps its history.
  pub fn replace_phone_number(
    &mut self,
    individual: &Individual,
    old: ContactMethodId,
    new: ContactMethodId,
  ) -> Result<bool> {
    self.backing(old)?;
    let present =
      individual.with(|d| d.numbers.iter().any(|n| self.same_endpoint(*n, old)));
    if !present {
      warn!(%old, individual = %individual.id(), "replaced contact method is not a number");
      return Ok(false);
    }

    let new = self.admit(new)?;
    if self.same_endpoint(old, new) {
      return Ok(false);
    }

    let bound = self.adopt_person(individual, new)?;
    let individual = self.attach(individual, new, false)?;

    individual.with_mut(|d| {
      d.related.retain(|c| !self.same_endpoint(*c, new));
      if let Some(pos) = d.numbers.iter().position(|n| self.same_endpoint(*n, old)) {
        let replaced = std::mem::replace(&mut d.numbers[pos], new);
        if !d.related.contains(&replaced) {
          d.related.push(replaced);
        }
      }
    });
    if let Some(uid) = bound {
      self.join_person_individual(new, uid)?;
    }
    self.dedupe_individual(&individual);

    self.notify(Notification::PhoneNumbersChanged {
      individual: individual.id(),
    });
    Ok(true)
  }

  /// Attach `cm` as a hidden contact method, e.g. a stale endpoint whose
  /// history belongs to this individual.
  pub fn register_contact_method(
    &mut self,
    individual: &Individual,
    cm: ContactMethodId,
  ) -> Result<()> {
    let cm = self.admit(cm)?;
    self.attach(individual, cm, false)?;
    Ok(())
  }

  /// The number to use without asking: the only one, or the last used.
  pub fn main_contact_method(
    &self,
    individual: &Individual,
  ) -> Option<ContactMethodId> {
    individual.with(|d| match d.numbers.as_slice() {
      [only] => Some(*only),
      numbers => d
        .last_used
        .filter(|lu| numbers.iter().any(|n| self.same_endpoint(*n, *lu))),
    })
  }

  /// Bind `cm` to a person, or unbind it with `None`. Rebinding to a
  /// different person is refused.
  pub fn set_person(
    &mut self,
    cm: ContactMethodId,
    person: Option<PersonId>,
  ) -> Result<()> {
    let previous = self.backing(cm)?.person;
    if previous == person {
      return Ok(());
    }
    if let Some(uid) = person {
      if !self.persons.contains_key(&uid) {
        return Err(Error::UnknownPerson(uid));
      }
      if let Some(bound) = previous {
        error!(%cm, %bound, requested = %uid, "contact method already bound");
        return Err(Error::PersonConflict {
          contact_method: cm,
          bound,
          requested: uid,
        });
      }
    }

    self.backing_mut(cm)?.person = person;
    self.notify(Notification::ContactChanged {
      contact_method: cm,
      previous,
      current: person,
    });

    if let Some(uid) = person {
      self.join_person_individual(cm, uid)?;
    }
    Ok(())
  }

  // ─── Internals ───────────────────────────────────────────────────────────

  /// Reject blanks and commit temporaries.
  fn admit(&mut self, cm: ContactMethodId) -> Result<ContactMethodId> {
    match self.backing(cm)?.kind {
      ContactMethodKind::Blank => Err(Error::BlankContactMethod(cm)),
      ContactMethodKind::Temporary => self.commit_temporary(cm),
      _ => Ok(cm),
    }
  }

  /// Check `cm` may join `individual` and bind it to the individual's person.
  /// Returns the person `cm` was already bound to.
  fn adopt_person(
    &mut self,
    individual: &Individual,
    cm: ContactMethodId,
  ) -> Result<Option<PersonId>> {
    let bound = self.backing(cm)?.person;
    match (individual.person(), bound) {
      (Some(requested), Some(bound)) if requested != bound => {
        error!(%cm, %bound, %requested, "contact method belongs to another person");
        Err(Error::PersonConflict {
          contact_method: cm,
          bound,
          requested,
        })
      }
      (Some(requested), None) => {
        self.backing_mut(cm)?.person = Some(requested);
        self.notify(Notification::ContactChanged {
          contact_method: cm,
          previous:       None,
          current:        Some(requested),
        });
        Ok(None)
      }
      _ => Ok(bound),
    }
  }

  /// Put `cm` in `individual`, merging with whatever individual `cm` already
  /// belonged to. Returns the surviving individual.
  pub(crate) fn attach(
    &mut self,
    individual: &Individual,
    cm: ContactMethodId,
    visible: bool,
  ) -> Result<Individual> {
    let individual = match self.backing(cm)?.individual.upgrade() {
      Some(existing) if !existing.ptr_eq(individual) => {
        self.merge_individuals(individual, &existing)?
      }
      _ => individual.clone(),
    };

    let backing_id = self.backing_id(cm)?;
    let last_used = self.backing(cm)?.stats.last_used;
    let same = |other: &ContactMethodId| self.backing_id(*other).ok() == Some(backing_id);

    individual.with_mut(|d| {
      let listed = d.numbers.iter().any(same);
      if visible {
        if !listed {
          d.numbers.push(cm);
        }
        d.related.retain(|c| !same(c));
      } else if !listed && !d.related.iter().any(same) {
        d.related.push(cm);
      }
      if let Some(at) = last_used {
        d.touch(cm, at);
      }
    });

    self.backing_mut(cm)?.individual = individual.downgrade();
    Ok(individual)
  }

  /// Make sure `cm` and person `uid` end up in one individual.
  pub(crate) fn join_person_individual(
    &mut self,
    cm: ContactMethodId,
    uid: PersonId,
  ) -> Result<Individual> {
    let of_person = self.persons.get(&uid).and_then(|r| r.individual.clone());
    let of_cm = self.backing(cm)?.individual.upgrade();

    match (of_person, of_cm) {
      (Some(p), Some(c)) if !p.ptr_eq(&c) => self.merge_individuals(&p, &c),
      (Some(p), Some(_)) => Ok(p),
      (Some(p), None) => self.attach(&p, cm, true),
      (None, Some(c)) => match c.person() {
        Some(bound) if bound != uid => {
          error!(%cm, %bound, %uid, "individual bound to another person");
          Err(Error::PersonConflict {
            contact_method: cm,
            bound,
            requested: uid,
          })
        }
        _ => {
          self.bind_individual_to_person(&c, uid);
          Ok(c)
        }
      },
      (None, None) => self.individual_for_person(uid),
    }
  }

  fn bind_individual_to_person(&mut self, individual: &Individual, uid: PersonId) {
    individual.with_mut(|d| d.person = Some(uid));
    if let Some(record) = self.persons.get_mut(&uid) {
      record.individual = Some(individual.clone());
    }
    self.bind_members(individual, uid);
  }

  /// Members of a person's individual that have no person yet join it.
  fn bind_members(&mut self, individual: &Individual, uid: PersonId) {
    for cm in individual.all_contact_methods() {
      let Ok(backing) = self.backing_mut(cm) else {
        continue;
      };
      if backing.person.is_some() {
        continue;
      }
      backing.person = Some(uid);
      self.notify(Notification::ContactChanged {
        contact_method: cm,
        previous:       None,
        current:        Some(uid),
      });
    }
  }

  /// Reconcile two individuals into one. The more populated one survives;
  /// ties go to the one bound to a person.
  pub(crate) fn merge_individuals(
    &mut self,
    a: &Individual,
    b: &Individual,
  ) -> Result<Individual> {
    if a.ptr_eq(b) {
      return Ok(a.clone());
    }
    let (person_a, person_b) = (a.person(), b.person());
    if let (Some(x), Some(y)) = (person_a, person_b)
      && x != y
    {
      error!(a = %a.id(), b = %b.id(), "individuals bound to different persons");
      return Err(Error::IncompatibleIndividuals(a.id(), b.id()));
    }

    let population_a = a.with(|d| d.population());
    let population_b = b.with(|d| d.population());
    let a_wins = population_a > population_b
      || (population_a == population_b && (person_a.is_some() || person_b.is_none()));
    let (survivor, loser) = if a_wins {
      (a.clone(), b.clone())
    } else {
      (b.clone(), a.clone())
    };

    let absorbed = loser.id();
    let (numbers, related, last_used, last_used_time, person) = loser.with(|d| {
      (
        d.numbers.clone(),
        d.related.clone(),
        d.last_used,
        d.last_used_time,
        d.person,
      )
    });

    survivor.with_mut(|d| {
      for cm in numbers {
        if !d.numbers.contains(&cm) {
          d.numbers.push(cm);
        }
      }
      for cm in related {
        if !d.numbers.contains(&cm) && !d.related.contains(&cm) {
          d.related.push(cm);
        }
      }
      if let (Some(cm), Some(at)) = (last_used, last_used_time) {
        d.touch(cm, at);
      }
      if d.person.is_none() {
        d.person = person;
      }
    });
    survivor.absorb_fronts(&loser);

    let weak = survivor.downgrade();
    for cm in survivor.all_contact_methods() {
      if let Ok(backing) = self.backing_mut(cm) {
        backing.individual = weak.clone();
      }
    }
    if let Some(uid) = survivor.person() {
      if let Some(record) = self.persons.get_mut(&uid) {
        record.individual = Some(survivor.clone());
      }
      self.bind_members(&survivor, uid);
    }
    self.dedupe_individual(&survivor);

    self.notify(Notification::IndividualsMerged {
      survivor: survivor.id(),
      absorbed,
    });
    self.notify(Notification::PhoneNumbersChanged {
      individual: survivor.id(),
    });
    Ok(survivor)
  }

  /// Keep one visible handle per backing record. Extra handles move to the
  /// hidden list.
  pub(crate) fn dedupe_individual(&self, individual: &Individual) {
    individual.with_mut(|d| {
      let mut seen = HashSet::new();
      let mut moved = Vec::new();
      d.numbers.retain(|cm| match self.backing_id(*cm) {
        Ok(id) if seen.insert(id) => true,
        _ => {
          moved.push(*cm);
          false
        }
      });
      for cm in moved {
        if !d.related.contains(&cm) {
          d.related.push(cm);
        }
      }
      let numbers = &d.numbers;
      d.related.retain(|cm| !numbers.contains(cm));
    });
  }
}
