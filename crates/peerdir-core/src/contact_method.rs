//! Contact methods, one reachable endpoint each.
//!
//! Callers hold a [`ContactMethodId`]. The id never dangles: when two contact
//! methods are merged, the losing id is re-pointed at the survivor's backing
//! record and keeps answering every query through it.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
  account::AccountId,
  event::EventId,
  individual::WeakIndividual,
  person::PersonId,
  stats::UsageStatistics,
  uri::Uri,
};

/// Separator used by [`ContactMethod::to_hash`].
pub const HASH_SEPARATOR: &str = "///";

/// A stable handle to a contact method.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ContactMethodId(pub(crate) u32);

impl fmt::Display for ContactMethodId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "cm#{}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactMethodKind {
  /// Known, never used.
  Unused,
  /// At least one event was recorded against it.
  Used,
  /// The self address of a configured account.
  Account,
  /// Being typed in. Its URI may still change and it never merges.
  Temporary,
  /// A placeholder with no endpoint.
  Blank,
}

impl ContactMethodKind {
  pub fn is_temporary(self) -> bool { matches!(self, Self::Temporary) }
}

/// Text history that came from a merged duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativeHistory {
  pub origin: ContactMethodId,
  pub uri:    Uri,
  pub events: Vec<EventId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct BackingId(pub(crate) u32);

/// The canonical state shared by every handle that points at it.
#[derive(Debug)]
pub(crate) struct Backing {
  pub(crate) uri:                   Uri,
  pub(crate) other_uris:            Vec<Uri>,
  pub(crate) account:               Option<AccountId>,
  pub(crate) person:                Option<PersonId>,
  pub(crate) kind:                  ContactMethodKind,
  pub(crate) category:              Option<String>,
  pub(crate) registered_name:       Option<String>,
  pub(crate) alternative_names:     BTreeMap<String, u32>,
  pub(crate) tracked:               bool,
  pub(crate) present:               bool,
  pub(crate) presence_message:      Option<String>,
  pub(crate) bookmarked:            bool,
  pub(crate) stats:                 UsageStatistics,
  pub(crate) events:                Vec<EventId>,
  pub(crate) alternative_histories: Vec<AlternativeHistory>,
  pub(crate) individual:            WeakIndividual,
  /// Every handle currently pointing at this record. The first one is the
  /// canonical handle.
  pub(crate) parents:               Vec<ContactMethodId>,
  /// Name the user is resolving, for temporaries only.
  pub(crate) pending_name:          Option<String>,
}

impl Backing {
  pub(crate) fn new(uri: Uri, kind: ContactMethodKind) -> Self {
    Self {
      uri,
      other_uris: Vec::new(),
      account: None,
      person: None,
      kind,
      category: None,
      registered_name: None,
      alternative_names: BTreeMap::new(),
      tracked: false,
      present: false,
      presence_message: None,
      bookmarked: false,
      stats: UsageStatistics::default(),
      events: Vec::new(),
      alternative_histories: Vec::new(),
      individual: WeakIndividual::default(),
      parents: Vec::new(),
      pending_name: None,
    }
  }
}

/// A read-only view of a contact method through its current backing record.
#[derive(Debug, Clone, Copy)]
pub struct ContactMethod<'a> {
  pub(crate) id:        ContactMethodId,
  pub(crate) backing:   &'a Backing,
  pub(crate) duplicate: bool,
}

impl<'a> ContactMethod<'a> {
  pub fn id(&self) -> ContactMethodId { self.id }

  /// The handle every duplicate of this contact method agrees on.
  pub fn canonical(&self) -> ContactMethodId {
    self.backing.parents.first().copied().unwrap_or(self.id)
  }

  pub fn uri(&self) -> &'a Uri { &self.backing.uri }

  /// Spellings absorbed from merged duplicates.
  pub fn other_uris(&self) -> &'a [Uri] { &self.backing.other_uris }

  pub fn account(&self) -> Option<&'a AccountId> {
    self.backing.account.as_ref()
  }

  pub fn person(&self) -> Option<PersonId> { self.backing.person }

  pub fn kind(&self) -> ContactMethodKind { self.backing.kind }

  pub fn category(&self) -> Option<&'a str> {
    self.backing.category.as_deref()
  }

  pub fn registered_name(&self) -> Option<&'a str> {
    self.backing.registered_name.as_deref()
  }

  /// Names this endpoint has been seen under, with how often.
  pub fn alternative_names(&self) -> &'a BTreeMap<String, u32> {
    &self.backing.alternative_names
  }

  /// Registered name if known, the URI otherwise.
  pub fn primary_name(&self) -> String {
    match &self.backing.registered_name {
      Some(name) => name.clone(),
      None => self.backing.uri.to_string(),
    }
  }

  /// The most frequently seen alternative name, falling back to
  /// [`primary_name`](Self::primary_name).
  pub fn best_name(&self) -> String {
    if let Some(name) = &self.backing.registered_name {
      return name.clone();
    }
    self
      .backing
      .alternative_names
      .iter()
      .max_by_key(|(_, n)| **n)
      .map(|(name, _)| name.clone())
      .unwrap_or_else(|| self.primary_name())
  }

  pub fn is_tracked(&self) -> bool { self.backing.tracked }

  pub fn is_present(&self) -> bool { self.backing.present }

  pub fn presence_message(&self) -> Option<&'a str> {
    self.backing.presence_message.as_deref()
  }

  pub fn is_bookmarked(&self) -> bool { self.backing.bookmarked }

  pub fn statistics(&self) -> &'a UsageStatistics { &self.backing.stats }

  pub fn last_used(&self) -> Option<DateTime<Utc>> {
    self.backing.stats.last_used
  }

  /// Whether this handle was merged into another contact method.
  pub fn is_duplicate(&self) -> bool { self.duplicate }

  /// Events recorded directly against this endpoint, oldest first.
  pub fn events(&self) -> &'a [EventId] { &self.backing.events }

  pub fn alternative_histories(&self) -> &'a [AlternativeHistory] {
    &self.backing.alternative_histories
  }

  /// Every handle sharing this backing record.
  pub fn aliases(&self) -> &'a [ContactMethodId] { &self.backing.parents }

  /// `uri///account///person`, the triple used to rebuild a contact method
  /// from storage.
  pub fn to_hash(&self) -> String {
    format!(
      "{}{sep}{}{sep}{}",
      self.backing.uri.key(),
      self.backing.account.as_ref().map(AccountId::as_str).unwrap_or(""),
      self
        .backing
        .person
        .map(|p| p.to_string())
        .unwrap_or_default(),
      sep = HASH_SEPARATOR,
    )
  }

  /// SHA-256 over the identity triple, hex encoded.
  pub fn fingerprint(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.to_hash().as_bytes());
    hex::encode(hasher.finalize())
  }

  pub fn snapshot(&self) -> ContactMethodSnapshot {
    ContactMethodSnapshot {
      id:              self.id,
      canonical:       self.canonical(),
      uri:             self.backing.uri.to_string(),
      other_uris:      self
        .backing
        .other_uris
        .iter()
        .map(ToString::to_string)
        .collect(),
      account:         self.backing.account.clone(),
      person:          self.backing.person,
      kind:            self.backing.kind,
      registered_name: self.backing.registered_name.clone(),
      tracked:         self.backing.tracked,
      present:         self.backing.present,
      bookmarked:      self.backing.bookmarked,
      statistics:      self.backing.stats.clone(),
    }
  }

  pub fn to_json(&self) -> crate::Result<String> {
    Ok(serde_json::to_string(&self.snapshot())?)
  }
}

/// A serialisable copy of a contact method's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactMethodSnapshot {
  pub id:              ContactMethodId,
  pub canonical:       ContactMethodId,
  pub uri:             String,
  pub other_uris:      Vec<String>,
  pub account:         Option<AccountId>,
  pub person:          Option<PersonId>,
  pub kind:            ContactMethodKind,
  pub registered_name: Option<String>,
  pub tracked:         bool,
  pub present:         bool,
  pub bookmarked:      bool,
  pub statistics:      UsageStatistics,
}
