//! A session ties the peer directory to the communication daemon.
//!
//! The [`Session`] owns the [`Directory`](peerdir_core::Directory), turns
//! daemon signals into directory operations and events, and keeps every open
//! timeline current. It is `!Send`: run it on a current-thread
//! runtime or a `LocalSet`.

pub mod config;
pub mod error;
pub mod session;
pub mod signal;

pub use config::SessionConfig;
pub use error::{Error, Result};
pub use session::Session;
pub use signal::{CallState, ChannelNameService, DaemonSignal};
