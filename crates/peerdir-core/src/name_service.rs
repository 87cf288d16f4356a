//! The outbound seam to the daemon's name service and presence layer.
//!
//! Requests are fire-and-forget; answers come back later as independent
//! inbound calls such as
//! [`Directory::on_registered_name_found`](crate::Directory::on_registered_name_found).

use std::{cell::RefCell, rc::Rc};

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{account::AccountId, uri::Uri};

/// Outcome of a name-service lookup, as reported by the daemon.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LookupStatus {
  Success,
  InvalidName,
  NotFound,
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NameRequest {
  /// Reverse lookup: which name is registered for this address?
  LookupAddress {
    account: Option<AccountId>,
    address: String,
  },
  /// Forward lookup: which address is registered under this name?
  LookupName {
    account: Option<AccountId>,
    name:    String,
  },
  RegisterName {
    account:  AccountId,
    password: String,
    name:     String,
  },
  SubscribePresence {
    account: AccountId,
    uri:     String,
    flag:    bool,
  },
}

pub trait NameService {
  fn send(&mut self, request: NameRequest);
}

/// Drops every request.
#[derive(Debug, Default)]
pub struct NoNameService;

impl NameService for NoNameService {
  fn send(&mut self, _request: NameRequest) {}
}

/// Keeps every request for later inspection. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct NameRequestLog(Rc<RefCell<Vec<NameRequest>>>);

impl NameRequestLog {
  pub fn take(&self) -> Vec<NameRequest> { std::mem::take(&mut self.0.borrow_mut()) }

  pub fn len(&self) -> usize { self.0.borrow().len() }

  pub fn is_empty(&self) -> bool { self.0.borrow().is_empty() }
}

impl NameService for NameRequestLog {
  fn send(&mut self, request: NameRequest) { self.0.borrow_mut().push(request); }
}

impl NameRequest {
  pub fn subscribe(account: AccountId, uri: &Uri, flag: bool) -> Self {
    Self::SubscribePresence {
      account,
      uri: uri.to_string(),
      flag,
    }
  }
}
