//! Error types for `peerdir-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::{account::AccountId, contact_method::ContactMethodId};

#[derive(Debug, Error)]
pub enum Error {
  #[error("empty uri")]
  EmptyUri,

  #[error("uri scheme `{scheme}` cannot be used with account {account}")]
  SchemeMismatch { scheme: String, account: AccountId },

  #[error("unknown account: {0}")]
  UnknownAccount(AccountId),

  #[error("unknown person: {0}")]
  UnknownPerson(Uuid),

  #[error("unknown contact method: {0}")]
  UnknownContactMethod(ContactMethodId),

  #[error("unknown event: {0}")]
  UnknownEvent(Uuid),

  #[error("contact method {0} is not temporary")]
  NotTemporary(ContactMethodId),

  #[error("contact method {0} is blank")]
  BlankContactMethod(ContactMethodId),

  #[error("cannot resolve an individual from an empty set of contact methods")]
  EmptyContactMethodSet,

  #[error("contact methods already belong to {0} different individuals")]
  ConflictingIndividuals(usize),

  #[error("contact methods are bound to {0} different persons")]
  ConflictingPersons(usize),

  #[error("contact method {contact_method} is bound to person {bound}, not {requested}")]
  PersonConflict {
    contact_method: ContactMethodId,
    bound:          Uuid,
    requested:      Uuid,
  },

  #[error("individuals {0} and {1} are bound to different persons")]
  IncompatibleIndividuals(Uuid, Uuid),

  #[error("malformed contact method hash: {0:?}")]
  MalformedHash(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
