//! Identity resolution for a communication client.
//!
//! Many URIs, accounts and contact records can denote the same peer, and the
//! evidence arrives piecemeal: a directory lookup, an incoming call, an
//! address book import, a name-service answer. The [`Directory`] decides
//! online which observations are the same endpoint, merges their state
//! without invalidating handles already given out, and groups endpoints into
//! [`Individual`]s.
//!
//! Everything here is single-threaded. Callers marshal external notifications
//! onto the thread that owns the directory.

pub mod account;
pub mod contact_method;
pub mod directory;
pub mod error;
pub mod event;
pub mod individual;
pub mod name_service;
pub mod notification;
pub mod person;
pub mod stats;
pub mod uri;

pub use account::{Account, AccountId, Protocol};
pub use contact_method::{ContactMethod, ContactMethodId, ContactMethodKind};
pub use directory::Directory;
pub use error::{Error, Result};
pub use event::{Direction, Event, EventCategory, EventId, EventStatus, NewEvent};
pub use individual::{Individual, WeakIndividual};
pub use name_service::{LookupStatus, NameRequest, NameRequestLog, NameService, NoNameService};
pub use notification::Notification;
pub use person::{Person, PersonId};
pub use uri::{ProtocolHint, Scheme, Uri};
