//! Registered names, interactive (temporary) contact methods and presence.

use tracing::{debug, warn};

use super::{CachedName, Directory};
use crate::{
  Error,
  Result,
  account::AccountId,
  contact_method::{Backing, ContactMethodId, ContactMethodKind},
  name_service::{LookupStatus, NameRequest},
  notification::Notification,
  uri::{Scheme, Uri},
};

impl Directory {
  // ─── Registered names ────────────────────────────────────────────────────

  /// Set the registered name. It can only be set once; a different second
  /// name is logged and ignored.
  pub fn set_registered_name(&mut self, cm: ContactMethodId, name: &str) -> Result<bool> {
    let backing = self.backing_mut(cm)?;
    if let Some(existing) = &backing.registered_name {
      if existing != name {
        warn!(%cm, %existing, attempted = %name, "registered name already set");
      }
      return Ok(false);
    }
    backing.registered_name = Some(name.to_string());
    self.notify(Notification::ContactMethodChanged { contact_method: cm });
    Ok(true)
  }

  /// Count one more sighting of `cm` under `name`.
  pub fn increment_alternative_name(&mut self, cm: ContactMethodId, name: &str) -> Result<u32> {
    let backing = self.backing_mut(cm)?;
    let count = backing.alternative_names.entry(name.to_string()).or_default();
    *count += 1;
    Ok(*count)
  }

  /// Answer from the name service, for either a reverse (address to name) or
  /// a forward (name to address) lookup.
  ///
  /// Every contact method filed under `address` learns its name and is filed
  /// under the name too, merging with same-endpoint records found there.
  /// Temporaries still waiting for exactly `name` take the answer; anything
  /// else is stale and dropped.
  pub fn on_registered_name_found(
    &mut self,
    account: Option<&AccountId>,
    status: LookupStatus,
    address: &str,
    name: &str,
  ) -> Result<()> {
    if status != LookupStatus::Success {
      debug!(%status, %address, %name, "name lookup failed");
      return Ok(());
    }
    if address.is_empty() || name.is_empty() {
      return Ok(());
    }

    let now = self.now();
    self.name_cache.insert(
      name.to_string(),
      CachedName {
        address: address.to_string(),
        at:      now,
      },
    );

    self.answer_temporaries(name, address)?;

    let account = self.lookup_account(account).unwrap_or_else(|error| {
      debug!(%error, "name found for an unknown account");
      None
    });

    let mut seen = Vec::new();
    for cm in self.indexed(&Uri::parse(address).key()) {
      let backing_id = self.backing_id(cm)?;
      if seen.contains(&backing_id) {
        continue;
      }
      seen.push(backing_id);

      if let Some(account) = &account
        && self.backing(cm)?.account.is_none()
      {
        self.bind_account(cm, account)?;
      }
      if let Some(account) = &account
        && self.backing(cm)?.account.as_ref() != Some(&account.id)
      {
        continue;
      }

      self.increment_alternative_name(cm, name)?;
      self.set_registered_name(cm, name)?;

      let cm = self.canonical(cm)?;
      let existing = self.indexed(name);
      self.index_insert(name.to_string(), cm);

      for other in existing {
        if self.same_endpoint(other, cm) {
          continue;
        }
        let ours = self.backing(cm)?;
        let theirs = self.backing(other)?;
        let same_account = theirs.account.is_some() && theirs.account == ours.account;
        let placeholder = theirs.account.is_none()
          && theirs.person.is_some()
          && theirs.uri.scheme() == Scheme::Ring;
        if same_account || placeholder {
          self.merge(cm, other);
        }
      }

      self.notify(Notification::RegisteredNameFound {
        contact_method: cm,
        name:           name.to_string(),
      });
    }
    Ok(())
  }

  fn answer_temporaries(&mut self, name: &str, address: &str) -> Result<()> {
    let waiting: Vec<ContactMethodId> = self
      .backings
      .iter()
      .flatten()
      .filter(|b| b.kind.is_temporary() && b.pending_name.as_deref() == Some(name))
      .filter_map(|b| b.parents.first().copied())
      .collect();

    for cm in waiting {
      let backing = self.backing_mut(cm)?;
      if backing.uri.key() != name {
        debug!(%cm, %name, "dropping stale name lookup");
        backing.pending_name = None;
        continue;
      }
      backing.pending_name = None;
      backing.registered_name = Some(name.to_string());
      backing.uri = Uri::parse(address);
      self.notify(Notification::ContactMethodChanged { contact_method: cm });
    }
    Ok(())
  }

  /// Ask the name service to register `name` for an account.
  pub fn register_name(&mut self, account: &AccountId, password: &str, name: &str) -> Result<bool> {
    let Some(found) = self.accounts.get(account) else {
      return Err(Error::UnknownAccount(account.clone()));
    };
    if !found.is_ring() {
      return Ok(false);
    }
    self.send(NameRequest::RegisterName {
      account:  account.clone(),
      password: password.to_string(),
      name:     name.to_string(),
    });
    Ok(true)
  }

  /// The daemon finished registering a name for one of our accounts.
  pub fn on_name_registration_ended(
    &mut self,
    account: &AccountId,
    status: LookupStatus,
    name: &str,
  ) -> Result<()> {
    if status != LookupStatus::Success {
      warn!(%account, %status, %name, "name registration failed");
      return Ok(());
    }
    if let Some(cm) = self.account_contact_method(account) {
      self.set_registered_name(cm, name)?;
      let cm = self.canonical(cm)?;
      self.index_insert(name.to_string(), cm);
    }
    Ok(())
  }

  // ─── Temporaries ─────────────────────────────────────────────────────────

  /// A contact method for text the user is still typing. It is not filed in
  /// the index and never merges.
  pub fn create_temporary(&mut self, uri: &str, account: Option<&AccountId>) -> Result<ContactMethodId> {
    let account = self.lookup_account(account)?;
    let mut backing = Backing::new(Uri::parse(uri), ContactMethodKind::Temporary);
    backing.account = account.map(|a| a.id);
    Ok(self.allocate(backing))
  }

  /// Change a temporary's URI. Any name learned for the old text is cleared.
  pub fn set_temporary_uri(&mut self, cm: ContactMethodId, uri: &str) -> Result<()> {
    let backing = self.backing_mut(cm)?;
    if !backing.kind.is_temporary() {
      return Err(Error::NotTemporary(cm));
    }
    let uri = Uri::parse(uri);
    if backing.uri == uri {
      return Ok(());
    }
    backing.uri = uri;
    backing.registered_name = None;
    backing.pending_name = None;
    self.notify(Notification::ContactMethodChanged { contact_method: cm });
    Ok(())
  }

  /// Resolve `name` for a temporary. A fresh cached answer applies at once;
  /// otherwise a forward lookup is sent and the answer applied when it
  /// arrives, provided the temporary still holds `name`.
  pub fn lookup_name(&mut self, cm: ContactMethodId, name: &str) -> Result<bool> {
    let backing = self.backing(cm)?;
    if !backing.kind.is_temporary() {
      return Err(Error::NotTemporary(cm));
    }
    let account = backing.account.clone();
    if let Some(id) = &account
      && self.accounts.get(id).is_some_and(|a| !a.is_ring())
    {
      return Ok(false);
    }

    self.backing_mut(cm)?.pending_name = Some(name.to_string());

    let now = self.now();
    let ttl = self.name_cache_ttl;
    if let Some(cached) = self.name_cache.get(name)
      && now - cached.at < ttl
    {
      let address = cached.address.clone();
      self.answer_temporaries(name, &address)?;
      return Ok(true);
    }

    self.send(NameRequest::LookupName {
      account,
      name: name.to_string(),
    });
    Ok(true)
  }

  /// Promote a temporary to a real contact method through
  /// [`resolve`](Self::resolve). The temporary handle itself stays inert.
  pub fn commit_temporary(&mut self, cm: ContactMethodId) -> Result<ContactMethodId> {
    let backing = self.backing(cm)?;
    if !backing.kind.is_temporary() {
      return Err(Error::NotTemporary(cm));
    }
    let uri = backing.uri.to_string();
    let account = backing.account.clone();
    let person = backing.person;
    let category = backing.category.clone();
    let name = backing.registered_name.clone();

    let resolved = self.resolve(&uri, account.as_ref(), person, category.as_deref())?;
    if let Some(name) = name {
      self.set_registered_name(resolved, &name)?;
    }
    Ok(resolved)
  }

  // ─── Presence ────────────────────────────────────────────────────────────

  /// Subscribe to (or unsubscribe from) presence for `cm`. Needs an account.
  pub fn set_tracked(&mut self, cm: ContactMethodId, tracked: bool) -> Result<bool> {
    let backing = self.backing(cm)?;
    let Some(account) = backing.account.clone() else {
      warn!(%cm, "cannot track presence without an account");
      return Ok(false);
    };
    if backing.tracked == tracked {
      return Ok(false);
    }
    let uri = backing.uri.clone();
    self.backing_mut(cm)?.tracked = tracked;
    self.send(NameRequest::subscribe(account, &uri, tracked));
    self.notify(Notification::ContactMethodChanged { contact_method: cm });
    Ok(true)
  }

  /// A presence update from the daemon.
  pub fn on_buddy_subscription(
    &mut self,
    account: &AccountId,
    uri: &str,
    present: bool,
    message: Option<&str>,
  ) -> Result<ContactMethodId> {
    let cm = self.resolve(uri, Some(account), None, None)?;
    let backing = self.backing_mut(cm)?;
    backing.tracked = true;
    let changed = backing.present != present;
    backing.present = present;
    backing.presence_message = message.map(String::from);
    if changed {
      self.notify(Notification::PresenceChanged {
        contact_method: cm,
        present,
      });
    }
    Ok(cm)
  }

  pub fn set_bookmarked(&mut self, cm: ContactMethodId, bookmarked: bool) -> Result<()> {
    let backing = self.backing_mut(cm)?;
    if backing.bookmarked != bookmarked {
      backing.bookmarked = bookmarked;
      self.notify(Notification::ContactMethodChanged { contact_method: cm });
    }
    Ok(())
  }
}
