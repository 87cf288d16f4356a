//! Change notifications emitted by the [`Directory`](crate::Directory).
//!
//! The directory queues these synchronously as state changes; whoever owns it
//! drains the queue with [`Directory::take_notifications`] and fans them out.
//!
//! [`Directory::take_notifications`]: crate::Directory::take_notifications

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  contact_method::ContactMethodId, event::EventId, person::PersonId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
  ContactMethodAdded {
    contact_method: ContactMethodId,
  },
  ContactMethodChanged {
    contact_method: ContactMethodId,
  },
  /// `duplicate` now delegates to `canonical`.
  Rebased {
    duplicate: ContactMethodId,
    canonical: ContactMethodId,
  },
  /// The person bound to a contact method changed.
  ContactChanged {
    contact_method: ContactMethodId,
    previous:       Option<PersonId>,
    current:        Option<PersonId>,
  },
  RegisteredNameFound {
    contact_method: ContactMethodId,
    name:           String,
  },
  PresenceChanged {
    contact_method: ContactMethodId,
    present:        bool,
  },
  EventAdded {
    event_id:       EventId,
    contact_method: ContactMethodId,
  },
  EventChanged {
    event_id: EventId,
  },
  PhoneNumbersChanged {
    individual: Uuid,
  },
  /// Every handle to `absorbed` now observes `survivor`.
  IndividualsMerged {
    survivor: Uuid,
    absorbed: Uuid,
  },
}
