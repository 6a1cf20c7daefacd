//! `strata`: command-line entry point for the Strata order-status ledger.
//!
//! # Usage
//!
//! ```text
//! strata ingest events.jsonl
//! strata maintain --as-of 2025-03-14T00:00:00Z
//! strata history ORD-1
//! strata snapshot --from 2025-03-01 --to 2025-03-31
//! strata serve --maintain-every 300
//! ```

mod ingest;
mod settings;

use std::{
  io::{self, BufReader, Write as _},
  path::PathBuf,
  sync::Arc,
  time::Duration,
};

use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use settings::Settings;
use strata_core::{
  event::EntityId,
  interval::IntervalRecord,
  maintain::Maintainer,
  resolve::{CalendarSpine, snapshot},
  store::LedgerStore as _,
};
use strata_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "strata", version, about = "Bitemporal order-status ledger")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "strata.toml")]
  config: PathBuf,

  /// Override the configured SQLite database path.
  #[arg(long, value_name = "PATH", env = "STRATA_STORE")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Serve the JSON API.
  Serve {
    /// Also run a maintenance pass every N seconds.
    #[arg(long, value_name = "SECS")]
    maintain_every: Option<u64>,
  },
  /// Append events from a newline-delimited JSON file (`-` for stdin).
  Ingest {
    file: PathBuf,
    /// Store the valid lines even if some are malformed.
    #[arg(long)]
    skip_invalid: bool,
  },
  /// Run one incremental maintenance pass.
  Maintain {
    /// End of the lookback window (RFC 3339). Defaults to now.
    #[arg(long)]
    as_of:         Option<DateTime<Utc>>,
    /// Override the configured lookback window.
    #[arg(long)]
    lookback_days: Option<u32>,
  },
  /// Re-derive intervals from the full event history.
  Rebuild {
    /// Only this entity; every entity when omitted.
    #[arg(long)]
    entity: Option<String>,
  },
  /// Print an entity's interval history.
  History { entity: String },
  /// Print each entity's status on every date in a range.
  Snapshot {
    #[arg(long)]
    from: NaiveDate,
    #[arg(long)]
    to:   NaiveDate,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();
  let mut settings = Settings::load(&cli.config)?;
  if let Some(path) = cli.store {
    settings.store_path = path;
  }

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;

  match cli.command {
    Command::Serve { maintain_every } => {
      let maintainer = Arc::new(Maintainer::new(store, settings.maintenance.clone()));
      serve(&settings, maintainer, maintain_every).await
    }
    Command::Ingest { file, skip_invalid } => ingest(&store, file, skip_invalid).await,
    Command::Maintain { as_of, lookback_days } => {
      let mut config = settings.maintenance.clone();
      if let Some(days) = lookback_days {
        config.lookback_days = days;
      }
      let maintainer = Maintainer::new(store, config);
      let report = maintainer.run(as_of.unwrap_or_else(Utc::now)).await?;
      print_json(&report)?;
      let failed = report.failures().count();
      if failed > 0 {
        bail!("{failed} entities failed maintenance");
      }
      Ok(())
    }
    Command::Rebuild { entity } => {
      let maintainer = Maintainer::new(store, settings.maintenance.clone());
      match entity {
        Some(id) => {
          let intervals = maintainer.rebuild_entity(&EntityId::new(id)?).await?;
          info!(intervals = intervals.len(), "entity rebuilt");
        }
        None => {
          maintainer.rebuild_all().await?;
        }
      }
      Ok(())
    }
    Command::History { entity } => {
      let id = EntityId::new(entity)?;
      let intervals = store.entity_intervals(&id).await?;
      if intervals.is_empty() {
        bail!("no intervals for {id}");
      }
      let records: Vec<IntervalRecord> = intervals.into_iter().map(Into::into).collect();
      print_json(&records)
    }
    Command::Snapshot { from, to } => {
      let spine = CalendarSpine::between(from, to)?;
      let rows = snapshot(&store, &spine, None).await?;
      let mut out = io::stdout().lock();
      for row in rows {
        serde_json::to_writer(&mut out, &row)?;
        writeln!(out)?;
      }
      Ok(())
    }
  }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn serve(
  settings: &Settings,
  maintainer: Arc<Maintainer<SqliteStore>>,
  maintain_every: Option<u64>,
) -> Result<()> {
  if let Some(secs) = maintain_every {
    let maintainer = Arc::clone(&maintainer);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
      loop {
        ticker.tick().await;
        if let Err(err) = maintainer.run(Utc::now()).await {
          warn!(error = %err, "scheduled maintenance pass failed");
        }
      }
    });
  }

  let app = axum::Router::new().nest("/api", strata_api::api_router(maintainer));
  let address = settings.address();

  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}

async fn ingest(store: &SqliteStore, file: PathBuf, skip_invalid: bool) -> Result<()> {
  let (events, bad) = if file.as_os_str() == "-" {
    ingest::parse_lines(io::stdin().lock())?
  } else {
    let f = std::fs::File::open(&file)
      .with_context(|| format!("failed to open {}", file.display()))?;
    ingest::parse_lines(BufReader::new(f))?
  };

  for b in &bad {
    warn!(line = b.line, reason = %b.reason, "malformed event");
  }
  if !bad.is_empty() && !skip_invalid {
    bail!("{} malformed lines; nothing stored (use --skip-invalid to store the rest)", bad.len());
  }

  let stored = store.append_events(events).await?;
  info!(stored = stored.len(), skipped = bad.len(), "ingest finished");
  Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
  let mut out = io::stdout().lock();
  serde_json::to_writer_pretty(&mut out, value)?;
  writeln!(out)?;
  Ok(())
}
