//! Accounts that contact methods can be bound to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::uri::{Scheme, Uri};

/// The daemon-assigned identifier of an account.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for AccountId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for AccountId {
  fn from(id: &str) -> Self { Self(id.to_string()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
  Sip,
  Ring,
}

/// The subset of account configuration identity resolution cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
  pub id:        AccountId,
  pub protocol:  Protocol,
  /// Registrar host. Empty for Ring accounts and IP-to-IP SIP accounts.
  #[serde(default)]
  pub hostname:  String,
  /// The account's own user part, e.g. its Ring hash.
  #[serde(default)]
  pub user_name: String,
  /// Direct IP-to-IP account: host-qualified URIs bridge to it.
  #[serde(default)]
  pub ip2ip:     bool,
}

impl Account {
  pub fn is_ring(&self) -> bool { self.protocol == Protocol::Ring }

  /// Whether `uri` may be dialled through this account.
  pub fn accepts_scheme(&self, scheme: Scheme) -> bool {
    match self.protocol {
      Protocol::Sip => scheme != Scheme::Ring,
      Protocol::Ring => !scheme.is_sip(),
    }
  }

  /// `uri` qualified with this account's host, if it lacks one.
  pub fn extend(&self, uri: &Uri) -> Option<Uri> {
    (!uri.has_hostname() && !self.hostname.is_empty())
      .then(|| uri.with_hostname(&self.hostname))
  }

  /// The account's own address. Empty when the user name is unknown.
  pub fn self_uri(&self) -> Uri {
    let raw = if self.user_name.is_empty() {
      String::new()
    } else if self.hostname.is_empty() {
      self.user_name.clone()
    } else {
      format!("{}@{}", self.user_name, self.hostname)
    };
    Uri::parse(&raw)
  }
}
