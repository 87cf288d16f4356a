//! Signals from the communication daemon, and the requests sent back to it.

use chrono::{DateTime, Utc};
use peerdir_core::{AccountId, LookupStatus, NameRequest, NameService};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
  Ringing,
  /// Media is flowing: the call was answered.
  Current,
  Over,
  Busy,
  Failure,
}

impl CallState {
  pub fn is_final(self) -> bool {
    matches!(self, Self::Over | Self::Busy | Self::Failure)
  }
}

/// Everything the daemon tells us. Delivered in order on the session's
/// thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum DaemonSignal {
  IncomingCall {
    account: AccountId,
    call_id: String,
    from:    String,
  },
  OutgoingCall {
    account: AccountId,
    call_id: String,
    to:      String,
  },
  CallStateChanged {
    call_id: String,
    state:   CallState,
  },
  IncomingMessage {
    account: AccountId,
    from:    String,
    body:    String,
    #[serde(default)]
    at:      Option<DateTime<Utc>>,
  },
  RegisteredNameFound {
    #[serde(default)]
    account: Option<AccountId>,
    status:  LookupStatus,
    address: String,
    name:    String,
  },
  NameRegistrationEnded {
    account: AccountId,
    status:  LookupStatus,
    name:    String,
  },
  NewBuddySubscription {
    account: AccountId,
    uri:     String,
    present: bool,
    #[serde(default)]
    message: Option<String>,
  },
}

/// A [`NameService`] that forwards requests to the daemon over a channel.
#[derive(Debug, Clone)]
pub struct ChannelNameService {
  tx: mpsc::UnboundedSender<NameRequest>,
}

impl ChannelNameService {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<NameRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }
}

impl NameService for ChannelNameService {
  fn send(&mut self, request: NameRequest) {
    if let Err(e) = self.tx.send(request) {
      warn!(request = ?e.0, "daemon went away; request dropped");
    }
  }
}
