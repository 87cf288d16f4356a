//! The directory: the single owner of every contact method, person, account
//! and event.
//!
//! Contact methods are stored as an arena of handles ([`ContactMethodId`])
//! over an arena of backing records. A merge re-points handles from one
//! backing record to another and frees the old one; handles themselves are
//! never freed.
//!
//! The implementation is split by concern:
//! - `resolve`: URI lookup and creation
//! - `merge`: contact method merging
//! - `resolver`: individual grouping
//! - `names`: registered names, temporaries and presence
//! - `events`: the event log

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::{
  Error,
  Result,
  account::{Account, AccountId},
  contact_method::{
    Backing,
    BackingId,
    ContactMethod,
    ContactMethodId,
    ContactMethodKind,
  },
  event::{Event, EventId},
  individual::Individual,
  name_service::{NameRequest, NameService},
  notification::Notification,
  person::{Person, PersonId},
  uri::Uri,
};

mod events;
mod merge;
mod names;
mod resolve;
mod resolver;

/// How long a forward name lookup answer stays usable, in seconds.
pub const DEFAULT_NAME_CACHE_TTL_SECS: i64 = 300;

#[derive(Debug, Clone, Copy)]
struct Slot {
  backing:  BackingId,
  original: BackingId,
}

struct PersonRecord {
  person:     Person,
  /// Strong: a person keeps its individual alive.
  individual: Option<Individual>,
}

#[derive(Debug, Clone)]
struct CachedName {
  address: String,
  at:      DateTime<Utc>,
}

type Clock = Box<dyn Fn() -> DateTime<Utc>>;

pub struct Directory {
  accounts:       HashMap<AccountId, Account>,
  account_selves: HashMap<AccountId, ContactMethodId>,
  persons:        HashMap<PersonId, PersonRecord>,
  slots:          Vec<Slot>,
  backings:       Vec<Option<Backing>>,
  /// Stripped URI key (and alternate spellings) to every handle filed there.
  index:          HashMap<String, Vec<ContactMethodId>>,
  events:         Vec<Event>,
  event_index:    HashMap<EventId, usize>,
  blank:          Option<ContactMethodId>,
  name_service:   Box<dyn NameService>,
  name_cache:     HashMap<String, CachedName>,
  name_cache_ttl: Duration,
  clock:          Clock,
  notifications:  Vec<Notification>,
}

impl Directory {
  pub fn new(name_service: impl NameService + 'static) -> Self {
    Self {
      accounts:       HashMap::new(),
      account_selves: HashMap::new(),
      persons:        HashMap::new(),
      slots:          Vec::new(),
      backings:       Vec::new(),
      index:          HashMap::new(),
      events:         Vec::new(),
      event_index:    HashMap::new(),
      blank:          None,
      name_service:   Box::new(name_service),
      name_cache:     HashMap::new(),
      name_cache_ttl: Duration::seconds(DEFAULT_NAME_CACHE_TTL_SECS),
      clock:          Box::new(Utc::now),
      notifications:  Vec::new(),
    }
  }

  pub fn with_name_cache_ttl(mut self, ttl: Duration) -> Self {
    self.name_cache_ttl = ttl;
    self
  }

  /// Replace the wall clock, for deterministic tests and replays.
  pub fn with_clock(
    mut self,
    clock: impl Fn() -> DateTime<Utc> + 'static,
  ) -> Self {
    self.clock = Box::new(clock);
    self
  }

  pub fn now(&self) -> DateTime<Utc> { (self.clock)() }

  // ─── Notifications ───────────────────────────────────────────────────────

  pub(crate) fn notify(&mut self, notification: Notification) {
    self.notifications.push(notification);
  }

  /// Drain every notification queued since the last call, in order.
  pub fn take_notifications(&mut self) -> Vec<Notification> {
    std::mem::take(&mut self.notifications)
  }

  pub(crate) fn send(&mut self, request: NameRequest) {
    debug!(?request, "name service request");
    self.name_service.send(request);
  }

  // ─── Accounts ────────────────────────────────────────────────────────────

  /// Register (or update) an account and resolve its own address.
  ///
  /// Returns the account's self contact method when it has a user name.
  pub fn register_account(
    &mut self,
    account: Account,
  ) -> Result<Option<ContactMethodId>> {
    let id = account.id.clone();
    let self_uri = account.self_uri();
    self.accounts.insert(id.clone(), account);

    if self_uri.is_empty() {
      return Ok(None);
    }

    let cm = self.resolve(&self_uri.to_string(), Some(&id), None, None)?;
    self.backing_mut(cm)?.kind = ContactMethodKind::Account;
    self.account_selves.insert(id, cm);
    Ok(Some(cm))
  }

  pub fn account(&self, id: &AccountId) -> Option<&Account> {
    self.accounts.get(id)
  }

  pub fn accounts(&self) -> impl Iterator<Item = &Account> {
    self.accounts.values()
  }

  /// The contact method representing the account itself.
  pub fn account_contact_method(
    &self,
    id: &AccountId,
  ) -> Option<ContactMethodId> {
    self.account_selves.get(id).copied()
  }

  pub(crate) fn lookup_account(
    &self,
    id: Option<&AccountId>,
  ) -> Result<Option<Account>> {
    id.map(|id| {
      self
        .accounts
        .get(id)
        .cloned()
        .ok_or_else(|| Error::UnknownAccount(id.clone()))
    })
    .transpose()
  }

  // ─── Persons ─────────────────────────────────────────────────────────────

  /// Insert a person, or update the name of an existing one.
  pub fn add_person(&mut self, person: Person) -> PersonId {
    let uid = person.uid;
    self
      .persons
      .entry(uid)
      .and_modify(|r| r.person.formatted_name = person.formatted_name.clone())
      .or_insert(PersonRecord {
        person,
        individual: None,
      });
    uid
  }

  pub fn person(&self, uid: PersonId) -> Option<&Person> {
    self.persons.get(&uid).map(|r| &r.person)
  }

  pub fn persons(&self) -> impl Iterator<Item = &Person> {
    self.persons.values().map(|r| &r.person)
  }

  // ─── Contact methods ─────────────────────────────────────────────────────

  pub(crate) fn backing_id(&self, cm: ContactMethodId) -> Result<BackingId> {
    self
      .slots
      .get(cm.0 as usize)
      .map(|s| s.backing)
      .ok_or(Error::UnknownContactMethod(cm))
  }

  pub(crate) fn backing(&self, cm: ContactMethodId) -> Result<&Backing> {
    let id = self.backing_id(cm)?;
    self
      .backings
      .get(id.0 as usize)
      .and_then(Option::as_ref)
      .ok_or(Error::UnknownContactMethod(cm))
  }

  pub(crate) fn backing_mut(
    &mut self,
    cm: ContactMethodId,
  ) -> Result<&mut Backing> {
    let id = self.backing_id(cm)?;
    self
      .backings
      .get_mut(id.0 as usize)
      .and_then(Option::as_mut)
      .ok_or(Error::UnknownContactMethod(cm))
  }

  pub fn contact_method(&self, cm: ContactMethodId) -> Result<ContactMethod<'_>> {
    let slot = self
      .slots
      .get(cm.0 as usize)
      .ok_or(Error::UnknownContactMethod(cm))?;
    Ok(ContactMethod {
      id:        cm,
      backing:   self.backing(cm)?,
      duplicate: slot.backing != slot.original,
    })
  }

  /// Whether both handles currently share one backing record.
  pub fn same_endpoint(&self, a: ContactMethodId, b: ContactMethodId) -> bool {
    match (self.backing_id(a), self.backing_id(b)) {
      (Ok(a), Ok(b)) => a == b,
      _ => false,
    }
  }

  /// The canonical handle for whatever `cm` currently points at.
  pub fn canonical(&self, cm: ContactMethodId) -> Result<ContactMethodId> {
    Ok(self.contact_method(cm)?.canonical())
  }

  /// One view per live backing record, through its canonical handle.
  pub fn contact_methods(&self) -> impl Iterator<Item = ContactMethod<'_>> {
    self.backings.iter().flatten().filter_map(|b| {
      b.parents.first().map(|id| ContactMethod {
        id:        *id,
        backing:   b,
        duplicate: false,
      })
    })
  }

  /// Canonical handles filed under `uri`, without creating anything.
  pub fn lookup(&self, uri: &str) -> Vec<ContactMethodId> {
    let mut found = Vec::new();
    for cm in self.index.get(&Uri::parse(uri).key()).into_iter().flatten() {
      if let Ok(canonical) = self.canonical(*cm)
        && !found.contains(&canonical)
      {
        found.push(canonical);
      }
    }
    found
  }

  /// The shared placeholder contact method. It cannot be attached to
  /// individuals or carry events.
  pub fn blank(&mut self) -> ContactMethodId {
    if let Some(cm) = self.blank {
      return cm;
    }
    let cm = self.allocate(Backing::new(Uri::parse(""), ContactMethodKind::Blank));
    self.blank = Some(cm);
    cm
  }

  pub(crate) fn allocate(&mut self, mut backing: Backing) -> ContactMethodId {
    let backing_id = BackingId(self.backings.len() as u32);
    let cm = ContactMethodId(self.slots.len() as u32);
    backing.parents.push(cm);
    self.backings.push(Some(backing));
    self.slots.push(Slot {
      backing:  backing_id,
      original: backing_id,
    });
    self.notify(Notification::ContactMethodAdded { contact_method: cm });
    cm
  }

  pub(crate) fn repoint(&mut self, cm: ContactMethodId, to: BackingId) {
    if let Some(slot) = self.slots.get_mut(cm.0 as usize) {
      slot.backing = to;
    }
  }

  pub(crate) fn take_backing(&mut self, id: BackingId) -> Option<Backing> {
    self.backings.get_mut(id.0 as usize).and_then(Option::take)
  }

  pub(crate) fn backing_by_id_mut(&mut self, id: BackingId) -> Option<&mut Backing> {
    self.backings.get_mut(id.0 as usize).and_then(Option::as_mut)
  }

  pub(crate) fn index_insert(&mut self, key: String, cm: ContactMethodId) {
    let entry = self.index.entry(key).or_default();
    if !entry.contains(&cm) {
      entry.push(cm);
    }
  }

  /// Handles filed under `key`, in filing order.
  pub(crate) fn indexed(&self, key: &str) -> Vec<ContactMethodId> {
    self.index.get(key).cloned().unwrap_or_default()
  }
}
