//! The single-threaded owner of the directory and its timelines.

use std::{
  cell::RefCell,
  collections::HashMap,
  rc::{Rc, Weak},
};

use chrono::{DateTime, Utc};
use peerdir_core::{
  AccountId,
  ContactMethodId,
  Direction,
  Directory,
  EventId,
  Individual,
  NameService,
  NewEvent,
};
use peerdir_timeline::{PeersTimeline, Timeline, TimelineSource};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
  config::SessionConfig,
  error::{Error, Result},
  signal::{CallState, DaemonSignal},
};

#[derive(Debug, Clone)]
struct PendingCall {
  contact_method: ContactMethodId,
  direction:      Direction,
  started:        DateTime<Utc>,
  answered:       Option<DateTime<Utc>>,
}

pub struct Session {
  directory: Directory,
  config:    SessionConfig,
  timelines: Vec<Weak<RefCell<Timeline>>>,
  peers:     PeersTimeline,
  calls:     HashMap<String, PendingCall>,
}

impl Session {
  /// Build a directory with the configured accounts and persons.
  pub fn new(config: SessionConfig, name_service: impl NameService + 'static) -> Result<Self> {
    let directory =
      Directory::new(name_service).with_name_cache_ttl(config.name_cache_ttl());
    Self::with_directory(directory, config)
  }

  /// Wrap an existing directory, e.g. one with a fixed clock.
  pub fn with_directory(mut directory: Directory, config: SessionConfig) -> Result<Self> {
    for person in &config.persons {
      directory.add_person(person.clone());
    }
    for account in &config.accounts {
      directory.register_account(account.clone())?;
    }
    directory.take_notifications();

    let mut peers = PeersTimeline::new();
    peers.init(&directory);
    info!(
      accounts = config.accounts.len(),
      persons = config.persons.len(),
      "session ready"
    );
    Ok(Self {
      directory,
      config,
      timelines: Vec::new(),
      peers,
      calls: HashMap::new(),
    })
  }

  pub fn directory(&self) -> &Directory { &self.directory }

  /// Mutate the directory directly. Call [`dispatch`](Self::dispatch)
  /// afterwards so timelines see the changes.
  pub fn directory_mut(&mut self) -> &mut Directory { &mut self.directory }

  pub fn config(&self) -> &SessionConfig { &self.config }

  pub fn peers(&self) -> &PeersTimeline { &self.peers }

  // ─── Timelines ───────────────────────────────────────────────────────────

  /// A live timeline for an individual. The session keeps it current until
  /// the caller drops it.
  pub fn timeline_for_individual(&mut self, individual: Individual) -> Rc<RefCell<Timeline>> {
    self.open_timeline(TimelineSource::Individual(individual))
  }

  pub fn timeline_for_contact_method(&mut self, cm: ContactMethodId) -> Rc<RefCell<Timeline>> {
    self.open_timeline(TimelineSource::ContactMethod(cm))
  }

  fn open_timeline(&mut self, source: TimelineSource) -> Rc<RefCell<Timeline>> {
    self.dispatch();
    let mut timeline = Timeline::new(source, self.config.grouping());
    timeline.init(&self.directory, self.directory.now());
    let timeline = Rc::new(RefCell::new(timeline));
    self.timelines.push(Rc::downgrade(&timeline));
    timeline
  }

  /// Fan queued directory notifications out to every live timeline.
  pub fn dispatch(&mut self) {
    let notifications = self.directory.take_notifications();
    if notifications.is_empty() {
      return;
    }
    self.timelines.retain(|t| t.strong_count() > 0);
    for notification in &notifications {
      debug!(?notification, "dispatching");
      self.peers.apply(&self.directory, notification);
      for timeline in self.timelines.iter().filter_map(Weak::upgrade) {
        timeline.borrow_mut().apply(&self.directory, notification);
      }
    }
  }

  /// Re-home timeline groups against the current time. Returns how many
  /// timelines changed.
  pub fn rebucket(&mut self) -> usize {
    let now = self.directory.now();
    self.timelines.retain(|t| t.strong_count() > 0);
    let changed = self
      .timelines
      .iter()
      .filter_map(Weak::upgrade)
      .filter(|t| t.borrow_mut().rebucket(now))
      .count();
    if changed > 0 {
      debug!(changed, "timelines rebucketed");
    }
    changed
  }

  // ─── Daemon signals ──────────────────────────────────────────────────────

  pub fn handle(&mut self, signal: DaemonSignal) -> Result<()> {
    let result = self.apply_signal(signal);
    self.dispatch();
    result
  }

  fn apply_signal(&mut self, signal: DaemonSignal) -> Result<()> {
    match signal {
      DaemonSignal::IncomingCall {
        account,
        call_id,
        from,
      } => self.track_call(&account, call_id, &from, Direction::Incoming),
      DaemonSignal::OutgoingCall {
        account,
        call_id,
        to,
      } => self.track_call(&account, call_id, &to, Direction::Outgoing),
      DaemonSignal::CallStateChanged { call_id, state } => {
        self.call_state_changed(&call_id, state)
      }
      DaemonSignal::IncomingMessage {
        account,
        from,
        body,
        at,
      } => {
        let cm = self.directory.resolve(&from, Some(&account), None, None)?;
        let at = at.unwrap_or_else(|| self.directory.now());
        self
          .directory
          .add_event(cm, NewEvent::message(Direction::Incoming, at, body))?;
        Ok(())
      }
      DaemonSignal::RegisteredNameFound {
        account,
        status,
        address,
        name,
      } => Ok(self.directory.on_registered_name_found(
        account.as_ref(),
        status,
        &address,
        &name,
      )?),
      DaemonSignal::NameRegistrationEnded {
        account,
        status,
        name,
      } => Ok(self.directory.on_name_registration_ended(&account, status, &name)?),
      DaemonSignal::NewBuddySubscription {
        account,
        uri,
        present,
        message,
      } => {
        self
          .directory
          .on_buddy_subscription(&account, &uri, present, message.as_deref())?;
        Ok(())
      }
    }
  }

  fn track_call(
    &mut self,
    account: &AccountId,
    call_id: String,
    peer: &str,
    direction: Direction,
  ) -> Result<()> {
    if self.calls.contains_key(&call_id) {
      return Err(Error::DuplicateCall(call_id));
    }
    let contact_method = self.directory.resolve(peer, Some(account), None, None)?;
    debug!(%call_id, %contact_method, ?direction, "call started");
    self.calls.insert(call_id, PendingCall {
      contact_method,
      direction,
      started: self.directory.now(),
      answered: None,
    });
    Ok(())
  }

  /// Calls become events when they end. A call that never reached
  /// [`CallState::Current`] is recorded as missed.
  fn call_state_changed(&mut self, call_id: &str, state: CallState) -> Result<()> {
    let now = self.directory.now();
    if !state.is_final() {
      let call = self
        .calls
        .get_mut(call_id)
        .ok_or_else(|| Error::UnknownCall(call_id.to_string()))?;
      if state == CallState::Current && call.answered.is_none() {
        call.answered = Some(now);
      }
      return Ok(());
    }

    let call = self
      .calls
      .remove(call_id)
      .ok_or_else(|| Error::UnknownCall(call_id.to_string()))?;
    let event = match call.answered {
      Some(answered) => NewEvent::call(call.direction, answered, now),
      None => NewEvent::call(call.direction, call.started, call.started).missed(),
    };
    self.directory.add_event(call.contact_method, event)?;
    Ok(())
  }

  /// Record a message the user sent.
  pub fn send_message(&mut self, cm: ContactMethodId, body: &str) -> Result<EventId> {
    let at = self.directory.now();
    let event_id = self
      .directory
      .add_event(cm, NewEvent::message(Direction::Outgoing, at, body))?;
    self.dispatch();
    Ok(event_id)
  }

  // ─── Event loop ──────────────────────────────────────────────────────────

  /// Process daemon signals until the sender hangs up, rebucketing
  /// timelines on the configured interval. Returns the session so callers
  /// can inspect the final state.
  pub async fn run(mut self, mut signals: mpsc::UnboundedReceiver<DaemonSignal>) -> Self {
    let mut ticker = tokio::time::interval(self.config.rebucket_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
      tokio::select! {
        signal = signals.recv() => match signal {
          Some(signal) => {
            if let Err(e) = self.handle(signal) {
              warn!("daemon signal rejected: {e}");
            }
          }
          None => break,
        },
        _ = ticker.tick() => {
          self.rebucket();
        }
      }
    }
    info!("daemon signal channel closed");
    self
  }
}
