//! URI model for contact methods.
//!
//! Daemons, directories and address books all hand out slightly different
//! spellings of the same endpoint: `<sip:1234@host;transport=tls>`,
//! `sip:1234@host`, `1234`, `ring:f00…`. A [`Uri`] keeps the parts needed for
//! identity and drops the rest. The scheme is recorded but is not part of the
//! registry key.

use std::{fmt, net::IpAddr, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Length of a Ring public-key hash, in hex digits.
pub const RING_HASH_LEN: usize = 40;

/// The URI scheme, when one was given.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Scheme {
  #[default]
  #[strum(serialize = "")]
  None,
  Sip,
  Sips,
  Ring,
}

impl Scheme {
  pub fn is_sip(self) -> bool { matches!(self, Self::Sip | Self::Sips) }
}

/// Best guess of which protocol a URI belongs to, from its shape alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolHint {
  /// A 40 hex digit Ring identity.
  Ring,
  /// A `ring:` URI that is not a hash, i.e. a registered username.
  RingUsername,
  /// `user@host` where host is a name.
  SipHost,
  /// `user@host` where host is an IP address.
  Ip,
  /// A bare user part with nothing to tell it apart.
  Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Uri {
  scheme:    Scheme,
  user_info: String,
  hostname:  String,
}

impl Uri {
  /// Parse a URI, stripping chevrons, scheme and `;`-parameters.
  pub fn parse(raw: &str) -> Self {
    let mut s = raw.trim();

    if let Some(start) = s.find('<') {
      let inner = &s[start + 1..];
      s = inner.split('>').next().unwrap_or(inner);
    }

    let mut scheme = Scheme::None;
    if let Some((head, rest)) = s.split_once(':')
      && let Ok(parsed) = Scheme::from_str(head)
      && parsed != Scheme::None
    {
      scheme = parsed;
      s = rest;
    }

    let s = s.split(';').next().unwrap_or_default().trim();

    let (user_info, hostname) = match s.split_once('@') {
      Some((user, host)) => (user.to_string(), host.to_string()),
      None => (s.to_string(), String::new()),
    };

    Self {
      scheme,
      user_info,
      hostname,
    }
  }

  pub fn scheme(&self) -> Scheme { self.scheme }

  pub fn user_info(&self) -> &str { &self.user_info }

  pub fn hostname(&self) -> &str { &self.hostname }

  pub fn has_hostname(&self) -> bool { !self.hostname.is_empty() }

  pub fn is_empty(&self) -> bool {
    self.user_info.is_empty() && self.hostname.is_empty()
  }

  /// The registry key: `user@host`, or just `user` without a host.
  pub fn key(&self) -> String {
    if self.hostname.is_empty() {
      self.user_info.clone()
    } else {
      format!("{}@{}", self.user_info, self.hostname)
    }
  }

  /// The same user part with `host` appended.
  pub fn with_hostname(&self, host: &str) -> Self {
    Self {
      scheme:    self.scheme,
      user_info: self.user_info.clone(),
      hostname:  host.to_string(),
    }
  }

  pub fn is_ring_hash(&self) -> bool {
    self.user_info.len() == RING_HASH_LEN
      && self.user_info.chars().all(|c| c.is_ascii_hexdigit())
  }

  pub fn protocol_hint(&self) -> ProtocolHint {
    if self.is_ring_hash() {
      ProtocolHint::Ring
    } else if self.scheme == Scheme::Ring {
      ProtocolHint::RingUsername
    } else if self.hostname.parse::<IpAddr>().is_ok() {
      ProtocolHint::Ip
    } else if self.has_hostname() {
      ProtocolHint::SipHost
    } else {
      ProtocolHint::Other
    }
  }

  /// Number of meaningful characters; used to pick the more specific of two
  /// spellings after a merge.
  pub fn specificity(&self) -> usize {
    self.user_info.len() + self.hostname.len()
  }
}

impl PartialEq for Uri {
  fn eq(&self, other: &Self) -> bool {
    self.user_info == other.user_info && self.hostname == other.hostname
  }
}

impl Eq for Uri {}

impl fmt::Display for Uri {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.scheme != Scheme::None {
      write!(f, "{}:", self.scheme)?;
    }
    f.write_str(&self.key())
  }
}

impl From<&str> for Uri {
  fn from(raw: &str) -> Self { Self::parse(raw) }
}

#[cfg(test)]
mod tests {
  use super::*;

  const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

  #[test]
  fn strips_chevrons_scheme_and_params() {
    let uri = Uri::parse("\"Bob\" <sips:bob@example.org;transport=tls>");
    assert_eq!(uri.scheme(), Scheme::Sips);
    assert_eq!(uri.user_info(), "bob");
    assert_eq!(uri.hostname(), "example.org");
    assert_eq!(uri.key(), "bob@example.org");
    assert_eq!(uri.to_string(), "sips:bob@example.org");
  }

  #[test]
  fn scheme_is_not_part_of_identity() {
    assert_eq!(Uri::parse("sip:1234@host"), Uri::parse("1234@host"));
    assert_ne!(Uri::parse("1234"), Uri::parse("1234@host"));
  }

  #[test]
  fn bare_user_part_has_no_host() {
    let uri = Uri::parse("  5551234 ");
    assert!(!uri.has_hostname());
    assert_eq!(uri.key(), "5551234");
    assert_eq!(uri.with_hostname("pbx").key(), "5551234@pbx");
  }

  #[test]
  fn protocol_hints() {
    assert_eq!(Uri::parse(HASH).protocol_hint(), ProtocolHint::Ring);
    assert_eq!(
      Uri::parse(&format!("ring:{HASH}")).protocol_hint(),
      ProtocolHint::Ring
    );
    assert_eq!(
      Uri::parse("ring:alice").protocol_hint(),
      ProtocolHint::RingUsername
    );
    assert_eq!(Uri::parse("1@10.0.0.2").protocol_hint(), ProtocolHint::Ip);
    assert_eq!(Uri::parse("1@pbx.lan").protocol_hint(), ProtocolHint::SipHost);
    assert_eq!(Uri::parse("1234").protocol_hint(), ProtocolHint::Other);
  }

  #[test]
  fn unknown_scheme_is_kept_in_user_part() {
    let uri = Uri::parse("tel:5551234");
    assert_eq!(uri.scheme(), Scheme::None);
    assert_eq!(uri.user_info(), "tel:5551234");
  }

  #[test]
  fn empty_after_stripping() {
    assert!(Uri::parse("<sip:>").is_empty());
    assert!(Uri::parse("").is_empty());
  }
}
