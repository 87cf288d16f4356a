//! Contact records ("persons") that contact methods can be bound to.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a contact record. Two persons are the same iff their uids are.
pub type PersonId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
  pub uid:            PersonId,
  pub formatted_name: String,
}

impl Person {
  pub fn new(formatted_name: impl Into<String>) -> Self {
    Self {
      uid:            Uuid::new_v4(),
      formatted_name: formatted_name.into(),
    }
  }
}
