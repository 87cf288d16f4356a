//! Resolving URIs to contact methods.
//!
//! The same endpoint may be filed under up to three keys: the stripped URI,
//! the URI qualified with its account's host, and the bare user part when the
//! URI's host is the account's own registrar. Lookups try each of them and
//! merge independent matches.

use tracing::{debug, warn};

use super::Directory;
use crate::{
  Error,
  Result,
  account::{Account, AccountId},
  contact_method::{Backing, ContactMethodId, ContactMethodKind},
  name_service::NameRequest,
  person::PersonId,
  uri::Uri,
};

impl Directory {
  /// Find or create the contact method for `uri`.
  ///
  /// Calling this twice with the same arguments returns the same handle
  /// unless a merge happened in between.
  pub fn resolve(
    &mut self,
    uri: &str,
    account: Option<&AccountId>,
    person: Option<PersonId>,
    category: Option<&str>,
  ) -> Result<ContactMethodId> {
    let uri = Uri::parse(uri);
    if uri.is_empty() {
      return Err(Error::EmptyUri);
    }

    let account = self.lookup_account(account)?;
    if let Some(account) = &account
      && !account.accepts_scheme(uri.scheme())
    {
      return Err(Error::SchemeMismatch {
        scheme:  uri.scheme().to_string(),
        account: account.id.clone(),
      });
    }

    if let Some(uid) = person
      && !self.persons.contains_key(&uid)
    {
      return Err(Error::UnknownPerson(uid));
    }

    self.resolve_parsed(uri, account.as_ref(), person, category)
  }

  fn resolve_parsed(
    &mut self,
    uri: Uri,
    account: Option<&Account>,
    person: Option<PersonId>,
    category: Option<&str>,
  ) -> Result<ContactMethodId> {
    let extended = account.and_then(|a| a.extend(&uri));

    if let Some(extended) = &extended
      && let Some(cm) = self.fill_details(
        &extended.key(),
        extended,
        account,
        person,
        category,
      )?
    {
      return Ok(cm);
    }

    let direct = self.fill_details(&uri.key(), &uri, account, person, category)?;

    let short = match account {
      Some(account)
        if uri.has_hostname() && uri.hostname() == account.hostname =>
      {
        self.match_short_form(&uri, account, person)?
      }
      _ => None,
    };

    match (direct, short) {
      (Some(direct), Some(short)) if !self.same_endpoint(direct, short) => {
        let (into, other) = self.prefer_contact(direct, short)?;
        self.merge(into, other);
        return self.canonical(into);
      }
      (Some(cm), _) | (None, Some(cm)) => return Ok(cm),
      (None, None) => {}
    }

    if let Some(cm) = self.loose_match(&uri, account, person)? {
      return Ok(cm);
    }

    self.create(uri, extended, account, person, category)
  }

  /// Return the first contact method filed under `key` that is compatible
  /// with the request, after completing it with the requested details.
  fn fill_details(
    &mut self,
    key: &str,
    stripped: &Uri,
    account: Option<&Account>,
    person: Option<PersonId>,
    category: Option<&str>,
  ) -> Result<Option<ContactMethodId>> {
    for cm in self.indexed(key) {
      let backing = self.backing(cm)?;
      if backing.kind.is_temporary() {
        continue;
      }

      let person_ok =
        person.is_none() || backing.person.is_none() || backing.person == person;
      if !person_ok {
        continue;
      }

      let uri_ok = backing.uri == *stripped
        || if backing.uri.has_hostname() {
          account.is_some_and(|a| a.ip2ip)
        } else {
          backing
            .account
            .as_ref()
            .and_then(|id| self.accounts.get(id))
            .and_then(|a| a.extend(&backing.uri))
            .is_some_and(|u| u == *stripped)
        };
      if !uri_ok {
        continue;
      }

      let account_ok = match (account, &backing.account) {
        (None, _) | (_, None) => true,
        (Some(a), Some(id)) => {
          a.id == *id || (a.ip2ip && stripped.has_hostname())
        }
      };
      if !account_ok {
        continue;
      }

      let needs_category = category.is_some() && backing.category.is_none();
      let needs_person = person.is_some() && backing.person.is_none();
      let needs_account = account.is_some() && backing.account.is_none();

      if needs_category {
        self.backing_mut(cm)?.category = category.map(String::from);
      }
      if needs_person {
        self.set_person(cm, person)?;
      }
      if needs_account && let Some(account) = account {
        self.bind_account(cm, account)?;
      }

      return Ok(Some(self.canonical(cm)?));
    }
    Ok(None)
  }

  /// `user@registrar` given for an account whose registrar is `registrar`:
  /// look for `user` already bound to that account.
  fn match_short_form(
    &mut self,
    uri: &Uri,
    account: &Account,
    person: Option<PersonId>,
  ) -> Result<Option<ContactMethodId>> {
    for cm in self.indexed(uri.user_info()) {
      let backing = self.backing(cm)?;
      if backing.account.as_ref() != Some(&account.id) {
        continue;
      }
      match (person, backing.person) {
        (Some(requested), Some(bound)) if requested != bound => continue,
        (Some(_), None) => self.set_person(cm, person)?,
        _ => {}
      }
      return Ok(Some(self.canonical(cm)?));
    }
    Ok(None)
  }

  /// Last resort before creating: anything filed under the URI whose account
  /// and person do not contradict the request.
  fn loose_match(
    &mut self,
    uri: &Uri,
    account: Option<&Account>,
    person: Option<PersonId>,
  ) -> Result<Option<ContactMethodId>> {
    for cm in self.indexed(&uri.key()) {
      let backing = self.backing(cm)?;
      if backing.kind.is_temporary() {
        continue;
      }
      let account_ok =
        account.is_none_or(|a| backing.account.as_ref() == Some(&a.id));
      let person_ok =
        person.is_none() || backing.person.is_none() || backing.person == person;
      if !(account_ok && person_ok) {
        continue;
      }
      if person.is_some() && backing.person.is_none() {
        self.set_person(cm, person)?;
      }
      return Ok(Some(self.canonical(cm)?));
    }
    Ok(None)
  }

  fn create(
    &mut self,
    uri: Uri,
    extended: Option<Uri>,
    account: Option<&Account>,
    person: Option<PersonId>,
    category: Option<&str>,
  ) -> Result<ContactMethodId> {
    let key = uri.key();
    let fresh = !self.index.contains_key(&key);

    let mut backing = Backing::new(uri.clone(), ContactMethodKind::Unused);
    backing.category = category.map(String::from);
    backing.account = account.map(|a| a.id.clone());
    let cm = self.allocate(backing);
    self.index_insert(key, cm);

    if fresh && let Some(account) = account {
      self.register_alternate_names(cm, &uri, extended.as_ref(), account);
    }

    if person.is_some() {
      self.set_person(cm, person)?;
    }

    if uri.is_ring_hash() {
      self.request_address_lookup(cm)?;
    }

    debug!(%cm, uri = %uri, "created contact method");
    Ok(cm)
  }

  fn register_alternate_names(
    &mut self,
    cm: ContactMethodId,
    uri: &Uri,
    extended: Option<&Uri>,
    account: &Account,
  ) {
    if uri.user_info().is_empty() {
      return;
    }
    if let Some(extended) = extended {
      self.index_insert(extended.key(), cm);
    }
    if uri.has_hostname() && uri.hostname() == account.hostname {
      self.index_insert(uri.user_info().to_string(), cm);
    }
  }

  /// Give an account to a contact method that has none, then fold in any
  /// same-account duplicate filed under the host-qualified spelling.
  pub(crate) fn bind_account(
    &mut self,
    cm: ContactMethodId,
    account: &Account,
  ) -> Result<()> {
    let backing = self.backing_mut(cm)?;
    if backing.account.is_some() {
      return Ok(());
    }
    backing.account = Some(account.id.clone());
    let uri = backing.uri.clone();
    self.notify(crate::Notification::ContactMethodChanged {
      contact_method: cm,
    });

    if let Some(extended) = account.extend(&uri) {
      let key = extended.key();
      let existing = self.indexed(&key);
      self.index_insert(key, cm);

      for other in existing {
        if self.same_endpoint(other, cm) {
          continue;
        }
        if self.backing(other)?.account.as_ref() == Some(&account.id) {
          let (into, loser) = self.prefer_contact(other, cm)?;
          self.merge(into, loser);
        }
      }
    }

    if uri.is_ring_hash() {
      self.request_address_lookup(cm)?;
    }
    Ok(())
  }

  /// Order two merge candidates so the one bound to a person survives. Ties
  /// keep `a`.
  pub(crate) fn prefer_contact(
    &self,
    a: ContactMethodId,
    b: ContactMethodId,
  ) -> Result<(ContactMethodId, ContactMethodId)> {
    let a_has = self.backing(a)?.person.is_some();
    let b_has = self.backing(b)?.person.is_some();
    Ok(if b_has && !a_has { (b, a) } else { (a, b) })
  }

  /// Ask the name service which name is registered for this address.
  pub(crate) fn request_address_lookup(
    &mut self,
    cm: ContactMethodId,
  ) -> Result<bool> {
    let backing = self.backing(cm)?;
    let account = backing.account.clone();
    let address = backing.uri.user_info().to_string();

    if let Some(id) = &account
      && self.accounts.get(id).is_some_and(|a| !a.is_ring())
    {
      return Ok(false);
    }

    self.send(NameRequest::LookupAddress { account, address });
    Ok(true)
  }

  /// Rebuild a contact method from its `uri///account///person` triple.
  ///
  /// Unknown accounts and persons are dropped rather than rejected.
  pub fn from_hash(&mut self, hash: &str) -> Result<ContactMethodId> {
    let fields: Vec<&str> = hash.split(crate::contact_method::HASH_SEPARATOR).collect();
    let [uri, account, person] = fields.as_slice() else {
      return Err(Error::MalformedHash(hash.to_string()));
    };

    let account = (!account.is_empty())
      .then(|| AccountId::new(*account))
      .filter(|id| {
        let known = self.accounts.contains_key(id);
        if !known {
          warn!(%id, "contact method hash refers to an unknown account");
        }
        known
      });

    let person = if person.is_empty() {
      None
    } else {
      let uid = person
        .parse::<PersonId>()
        .map_err(|_| Error::MalformedHash(hash.to_string()))?;
      self.persons.contains_key(&uid).then_some(uid)
    };

    self.resolve(uri, account.as_ref(), person, None)
  }
}
