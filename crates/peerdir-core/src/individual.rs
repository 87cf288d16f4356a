//! Individuals: the identity-level grouping of contact methods.
//!
//! An [`Individual`] is a cheap, shared handle. Holders keep it alive; a
//! contact method only points back at it through a [`WeakIndividual`]. When
//! two individuals are found to be the same peer, every handle to the absorbed
//! one is re-pointed at the survivor's data, so existing holders observe the
//! merged state without having to swap handles.

use std::{
  cell::RefCell,
  fmt,
  rc::{Rc, Weak},
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{contact_method::ContactMethodId, person::PersonId};

#[derive(Debug)]
pub(crate) struct IndividualData {
  pub(crate) id:             Uuid,
  pub(crate) person:         Option<PersonId>,
  /// Visible contact methods, in user order.
  pub(crate) numbers:        Vec<ContactMethodId>,
  /// Hidden contact methods whose history still belongs here.
  pub(crate) related:        Vec<ContactMethodId>,
  pub(crate) last_used:      Option<ContactMethodId>,
  pub(crate) last_used_time: Option<DateTime<Utc>>,
  fronts:                    Vec<Weak<Front>>,
}

impl IndividualData {
  pub(crate) fn all(&self) -> impl Iterator<Item = ContactMethodId> + '_ {
    self.numbers.iter().chain(self.related.iter()).copied()
  }

  pub(crate) fn population(&self) -> usize {
    self.numbers.len() + self.related.len()
  }

  /// Record that `cm` was used at `at`. O(1).
  pub(crate) fn touch(&mut self, cm: ContactMethodId, at: DateTime<Utc>) -> bool {
    if self.last_used_time.is_some_and(|t| t >= at) {
      return false;
    }
    self.last_used = Some(cm);
    self.last_used_time = Some(at);
    true
  }
}

type SharedData = Rc<RefCell<IndividualData>>;

#[derive(Debug)]
struct Front {
  data: RefCell<SharedData>,
}

#[derive(Clone)]
pub struct Individual(Rc<Front>);

impl Individual {
  pub(crate) fn new(person: Option<PersonId>) -> Self {
    let data = Rc::new(RefCell::new(IndividualData {
      id: Uuid::new_v4(),
      person,
      numbers: Vec::new(),
      related: Vec::new(),
      last_used: None,
      last_used_time: None,
      fronts: Vec::new(),
    }));
    let front = Rc::new(Front {
      data: RefCell::new(data.clone()),
    });
    data.borrow_mut().fronts.push(Rc::downgrade(&front));
    Self(front)
  }

  fn data(&self) -> SharedData { self.0.data.borrow().clone() }

  pub(crate) fn with<R>(&self, f: impl FnOnce(&IndividualData) -> R) -> R {
    f(&self.data().borrow())
  }

  pub(crate) fn with_mut<R>(
    &self,
    f: impl FnOnce(&mut IndividualData) -> R,
  ) -> R {
    f(&mut self.data().borrow_mut())
  }

  /// Stable for the lifetime of the merged identity: an absorbed individual
  /// reports the survivor's id.
  pub fn id(&self) -> Uuid { self.with(|d| d.id) }

  pub fn person(&self) -> Option<PersonId> { self.with(|d| d.person) }

  pub fn phone_numbers(&self) -> Vec<ContactMethodId> {
    self.with(|d| d.numbers.clone())
  }

  pub fn related_contact_methods(&self) -> Vec<ContactMethodId> {
    self.with(|d| d.related.clone())
  }

  pub fn has_hidden_contact_methods(&self) -> bool {
    self.with(|d| !d.related.is_empty())
  }

  /// Visible then hidden contact methods.
  pub fn all_contact_methods(&self) -> Vec<ContactMethodId> {
    self.with(|d| d.all().collect())
  }

  pub fn last_used_contact_method(&self) -> Option<ContactMethodId> {
    self.with(|d| d.last_used)
  }

  pub fn last_used_time(&self) -> Option<DateTime<Utc>> {
    self.with(|d| d.last_used_time)
  }

  /// More than one visible number and none used yet.
  pub fn requires_user_selection(&self) -> bool {
    self.with(|d| d.numbers.len() > 1 && d.last_used.is_none())
  }

  pub fn ptr_eq(&self, other: &Self) -> bool {
    Rc::ptr_eq(&self.data(), &other.data())
  }

  pub fn downgrade(&self) -> WeakIndividual {
    WeakIndividual(Rc::downgrade(&self.0))
  }

  /// Take over `loser`'s data pointer: every handle to `loser` now observes
  /// `self`. The caller has already moved the contact method lists.
  pub(crate) fn absorb_fronts(&self, loser: &Self) {
    let survivor = self.data();
    let absorbed = loser.data();
    if Rc::ptr_eq(&survivor, &absorbed) {
      return;
    }

    let fronts = std::mem::take(&mut absorbed.borrow_mut().fronts);
    for weak in &fronts {
      if let Some(front) = weak.upgrade() {
        *front.data.borrow_mut() = survivor.clone();
      }
    }
    let mut data = survivor.borrow_mut();
    data.fronts.extend(fronts);
    data.fronts.retain(|f| f.strong_count() > 0);
  }
}

impl PartialEq for Individual {
  fn eq(&self, other: &Self) -> bool { self.ptr_eq(other) }
}

impl Eq for Individual {}

impl fmt::Debug for Individual {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.with(|d| {
      f.debug_struct("Individual")
        .field("id", &d.id)
        .field("person", &d.person)
        .field("numbers", &d.numbers)
        .field("related", &d.related)
        .finish()
    })
  }
}

/// A non-owning reference from a contact method to its individual.
#[derive(Clone, Default)]
pub struct WeakIndividual(Weak<Front>);

impl WeakIndividual {
  pub fn upgrade(&self) -> Option<Individual> { self.0.upgrade().map(Individual) }
}

impl fmt::Debug for WeakIndividual {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.upgrade() {
      Some(individual) => write!(f, "WeakIndividual({})", individual.id()),
      None => f.write_str("WeakIndividual(dangling)"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn weak_reference_does_not_keep_alive() {
    let individual = Individual::new(None);
    let weak = individual.downgrade();
    assert!(weak.upgrade().is_some());
    drop(individual);
    assert!(weak.upgrade().is_none());
  }

  #[test]
  fn absorbed_handles_observe_survivor() {
    let survivor = Individual::new(None);
    let loser = Individual::new(None);
    let held = loser.clone();
    let weak = loser.downgrade();

    survivor.absorb_fronts(&loser);

    assert!(held.ptr_eq(&survivor));
    assert_eq!(held.id(), survivor.id());
    assert!(weak.upgrade().is_some_and(|i| i == survivor));
  }

  #[test]
  fn chained_absorption_repoints_every_front() {
    let a = Individual::new(None);
    let b = Individual::new(None);
    let c = Individual::new(None);

    b.absorb_fronts(&c);
    a.absorb_fronts(&b);

    assert_eq!(c, a);
    assert_eq!(b.id(), a.id());
  }

  #[test]
  fn touch_is_monotonic() {
    let individual = Individual::new(None);
    let t0 = DateTime::<Utc>::from_timestamp(100, 0).unwrap();
    let t1 = DateTime::<Utc>::from_timestamp(50, 0).unwrap();
    assert!(individual.with_mut(|d| d.touch(ContactMethodId(1), t0)));
    assert!(!individual.with_mut(|d| d.touch(ContactMethodId(2), t1)));
    assert_eq!(individual.last_used_contact_method(), Some(ContactMethodId(1)));
  }
}
