//! `dripflow`: operator CLI for a Dripflow SQLite store.
//!
//! Reads `dripflow.toml` (or the path given with `--config`), opens the
//! store and runs one command against the enrollment manager. Results are
//! printed as JSON.
//!
//! ```
//! dripflow stream create --origin course:1 --private
//! dripflow event add <STREAM_ID> --content lesson:1 --offset P1D
//! dripflow join <STREAM_ID> --subscriber user:7
//! dripflow events <STREAM_ID> --subscriber user:7
//! ```

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use dripflow_core::{
  clock::SystemClock,
  event::{EventUpdate, NewEvent},
  manager::EnrollmentManager,
  reference::{Reference, Subscriber},
  resolver::StateResolver,
  store::DripStore,
  strategy::StrategyRegistry,
  stream::{NewStream, Stream, StreamUpdate, UnlockMode},
};
use dripflow_store_sqlite::SqliteStore;
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::settings::CliConfig;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "dripflow", version, about = "Drip-content unlock engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "dripflow.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create, inspect, update and delete streams.
  #[command(subcommand)]
  Stream(StreamCommand),

  /// Add and update events.
  #[command(subcommand)]
  Event(EventCommand),

  /// Enrol a subscriber; keeps the original join time if already enrolled.
  Join(Enrolment),

  /// Enrol a subscriber, resetting the join time to now.
  Rejoin(Enrolment),

  /// Remove a subscriber from a stream.
  Leave(Enrolment),

  /// List a subscriber's enrolments.
  Subscriptions {
    #[arg(long)]
    subscriber: Reference,
  },

  /// Resolve every visible event of a stream.
  Events(Viewer),

  /// Print the cache key for a stream listing.
  CacheKey(Viewer),
}

#[derive(Subcommand)]
enum StreamCommand {
  Create {
    /// Owning entity, as `type:id`.
    #[arg(long)]
    origin:   Reference,
    /// Unlock on the calendar from this RFC 3339 instant.
    #[arg(long, value_name = "START_DATE")]
    fixed:    Option<DateTime<Utc>>,
    #[arg(long)]
    private:  bool,
    #[arg(long)]
    inactive: bool,
  },
  Show {
    stream_id: Uuid,
  },
  /// Look up the first stream of an origin.
  Find {
    #[arg(long)]
    origin: Reference,
  },
  Update {
    stream_id:        Uuid,
    #[arg(long)]
    public:           Option<bool>,
    #[arg(long)]
    active:           Option<bool>,
    #[arg(long)]
    mode:             Option<UnlockMode>,
    #[arg(long, conflicts_with = "clear_start_date")]
    start_date:       Option<DateTime<Utc>>,
    #[arg(long)]
    clear_start_date: bool,
  },
  Delete {
    stream_id: Uuid,
  },
}

#[derive(Subcommand)]
enum EventCommand {
  Add {
    stream_id: Uuid,
    /// Content entity, as `type:id`.
    #[arg(long)]
    content:   Reference,
    /// Seconds, or an ISO 8601 duration such as `P1DT2H`.
    #[arg(long, default_value = "0")]
    offset:    String,
    #[arg(long)]
    hidden:    bool,
  },
  Update {
    event_id: Uuid,
    #[arg(long)]
    offset:   Option<String>,
    #[arg(long)]
    visible:  Option<bool>,
  },
  /// Resolve one event.
  Show {
    event_id:   Uuid,
    #[arg(long)]
    subscriber: Option<Reference>,
  },
}

#[derive(clap::Args)]
struct Enrolment {
  stream_id:  Uuid,
  #[arg(long)]
  subscriber: Reference,
}

#[derive(clap::Args)]
struct Viewer {
  stream_id:  Uuid,
  /// Omit to view as a guest.
  #[arg(long)]
  subscriber: Option<Reference>,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
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
  let cfg = CliConfig::load(&cli.config)?;

  let strategies = StrategyRegistry::from_config(&cfg.engine)
    .context("invalid strategies table")?;
  let resolver = StateResolver::new(
    strategies,
    Arc::new(SystemClock),
    Arc::new(cfg.catalog()),
  );

  let store_path = cfg.store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  tracing::debug!(path = ?store_path, "opened store");

  let manager = EnrollmentManager::new(store, resolver);
  run(&manager, cli.command).await
}

async fn run(
  manager: &EnrollmentManager<SqliteStore>,
  command: Command,
) -> anyhow::Result<()> {
  let store = manager.store();

  match command {
    Command::Stream(cmd) => run_stream(store, cmd).await,
    Command::Event(cmd) => run_event(manager, cmd).await,

    Command::Join(args) => {
      let stream = load_stream(store, args.stream_id).await?;
      print_json(&manager.join(&args.subscriber, &stream).await?)
    }
    Command::Rejoin(args) => {
      let stream = load_stream(store, args.stream_id).await?;
      print_json(&manager.rejoin(&args.subscriber, &stream).await?)
    }
    Command::Leave(args) => {
      let stream = load_stream(store, args.stream_id).await?;
      let removed = manager.leave(&args.subscriber, &stream).await?;
      print_json(&serde_json::json!({ "removed": removed }))
    }
    Command::Subscriptions { subscriber } => {
      print_json(&manager.subscriptions_of(&subscriber).await?)
    }

    Command::Events(args) => {
      let stream = load_stream(store, args.stream_id).await?;
      let states = manager
        .get_stream_events(as_subscriber(&args.subscriber), &stream)
        .await
        .context("failed to resolve stream events")?;
      print_json(&states)
    }
    Command::CacheKey(args) => {
      let stream = load_stream(store, args.stream_id).await?;
      let key = manager
        .get_cache_key(as_subscriber(&args.subscriber), &stream)
        .await?;
      println!("{key}");
      Ok(())
    }
  }
}

async fn run_stream(store: &SqliteStore, command: StreamCommand) -> anyhow::Result<()> {
  match command {
    StreamCommand::Create { origin, fixed, private, inactive } => {
      let mut input = match fixed {
        Some(start) => NewStream::fixed(origin, start),
        None => NewStream::new(origin),
      };
      if private {
        input = input.private();
      }
      if inactive {
        input = input.inactive();
      }
      print_json(&store.create_stream(input).await?)
    }
    StreamCommand::Show { stream_id } => {
      print_json(&load_stream(store, stream_id).await?)
    }
    StreamCommand::Find { origin } => {
      let stream = store
        .get_stream_by_origin(&origin)
        .await?
        .with_context(|| format!("no stream for {origin}"))?;
      print_json(&stream)
    }
    StreamCommand::Update {
      stream_id,
      public,
      active,
      mode,
      start_date,
      clear_start_date,
    } => {
      let update = StreamUpdate {
        is_public:   public,
        unlock_mode: mode,
        start_date:  if clear_start_date { Some(None) } else { start_date.map(Some) },
        is_active:   active,
      };
      print_json(&store.update_stream(stream_id, update).await?)
    }
    StreamCommand::Delete { stream_id } => {
      let deleted = store.delete_stream(stream_id).await?;
      print_json(&serde_json::json!({ "deleted": deleted }))
    }
  }
}

async fn run_event(
  manager: &EnrollmentManager<SqliteStore>,
  command: EventCommand,
) -> anyhow::Result<()> {
  let store = manager.store();

  match command {
    EventCommand::Add { stream_id, content, offset, hidden } => {
      let mut input = NewEvent::new(stream_id, content).with_offset(offset);
      if hidden {
        input = input.hidden();
      }
      print_json(&store.add_event(input).await?)
    }
    EventCommand::Update { event_id, offset, visible } => {
      let update = EventUpdate { offset_interval: offset, is_visible: visible };
      print_json(&store.update_event(event_id, update).await?)
    }
    EventCommand::Show { event_id, subscriber } => {
      let event = store
        .get_event(event_id)
        .await?
        .with_context(|| format!("event {event_id} not found"))?;
      let state = manager
        .resolve_event(as_subscriber(&subscriber), &event)
        .await
        .context("failed to resolve event")?;
      print_json(&state)
    }
  }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

async fn load_stream(store: &SqliteStore, stream_id: Uuid) -> anyhow::Result<Stream> {
  store
    .get_stream(stream_id)
    .await?
    .with_context(|| format!("stream {stream_id} not found"))
}

fn as_subscriber(subscriber: &Option<Reference>) -> Option<&dyn Subscriber> {
  subscriber.as_ref().map(|s| s as &dyn Subscriber)
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
