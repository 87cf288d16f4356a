//! peerdir replay binary.
//!
//! Reads `peerdir.toml` (or the path given with `--config`) for accounts,
//! persons and tuning, replays a JSON file of daemon signals through a
//! session, and prints the resulting peers and their timelines.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use peerdir_core::ContactMethodId;
use peerdir_session::{ChannelNameService, DaemonSignal, Session, SessionConfig};
use peerdir_timeline::{NodeKind, Timeline};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Replay daemon signals through the peer directory")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "peerdir.toml")]
  config: PathBuf,

  /// JSON file holding the signals to replay.
  replay: PathBuf,

  /// Print contact methods as JSON instead of timelines.
  #[arg(long)]
  json: bool,
}

#[derive(Deserialize)]
struct Replay {
  #[serde(default)]
  config:  Option<SessionConfig>,
  signals: Vec<DaemonSignal>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("PEERDIR"))
    .build()
    .context("failed to read config file")?;
  let mut session_cfg: SessionConfig = settings
    .try_deserialize()
    .context("failed to deserialise SessionConfig")?;

  let raw = std::fs::read_to_string(&cli.replay)
    .with_context(|| format!("failed to read {:?}", cli.replay))?;
  let replay: Replay =
    serde_json::from_str(&raw).context("failed to parse replay file")?;
  if let Some(inline) = replay.config {
    session_cfg.accounts.extend(inline.accounts);
    session_cfg.persons.extend(inline.persons);
  }

  let (names, mut requests) = ChannelNameService::new();
  let requests = tokio::spawn(async move {
    let mut count = 0usize;
    while let Some(request) = requests.recv().await {
      tracing::info!(?request, "name service request");
      count += 1;
    }
    count
  });

  let session = Session::new(session_cfg, names).context("failed to start session")?;
  let (tx, rx) = mpsc::unbounded_channel();
  let total = replay.signals.len();
  for signal in replay.signals {
    tx.send(signal).context("session hung up")?;
  }
  drop(tx);

  let mut session = session.run(rx).await;
  tracing::info!(signals = total, "replay finished");

  if cli.json {
    let snapshots: Vec<_> = session
      .directory()
      .contact_methods()
      .map(|cm| cm.snapshot())
      .collect();
    println!("{}", serde_json::to_string_pretty(&snapshots)?);
  } else {
    let peers: Vec<ContactMethodId> = session.peers().entries().collect();
    for cm in peers {
      let timeline = session.timeline_for_contact_method(cm);
      print_timeline(&session, cm, &timeline.borrow())?;
    }
  }

  // The name service closes with the session.
  drop(session);
  let sent = requests.await.context("request logger panicked")?;
  tracing::info!(sent, "name service requests");
  Ok(())
}

fn print_timeline(session: &Session, cm: ContactMethodId, timeline: &Timeline) -> anyhow::Result<()> {
  let view = session.directory().contact_method(cm)?;
  println!("{} <{}>", view.best_name(), view.uri());
  for root in timeline.roots().iter().rev() {
    let Some(node) = timeline.node(*root) else {
      continue;
    };
    if let NodeKind::TimeCategory { category, entries } = node.kind {
      println!("  {category} ({entries})");
    }
    for group in timeline.children(*root).iter().rev() {
      let Some((kind, summary)) = timeline.node(*group).and_then(|n| n.group()) else {
        continue;
      };
      println!(
        "    {kind:?}: {} in, {} out, {} missed, {} unread",
        summary.incoming,
        summary.outgoing,
        summary.missed_incoming + summary.missed_outgoing,
        summary.unread,
      );
    }
  }
  Ok(())
}
