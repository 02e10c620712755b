//! Subgraph mapping replay CLI.
//!
//! Replays decoded triggers through the mapping handlers and keeps the
//! projected entities in a state directory between runs.
//!
//! # Usage
//!
//! ```bash
//! # Replay a trigger file with the sources declared in config.toml
//! subgraph-mappings run --config config.toml --events triggers.ndjson --state-dir state
//!
//! # Keep going when a handler fails
//! subgraph-mappings run --events triggers.ndjson --policy skip
//!
//! # List the templates and their handlers
//! subgraph-mappings handlers
//!
//! # Print one entity type, or a single entity
//! subgraph-mappings inspect --state-dir state --entity Gravatar --id 42
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use subgraph::{Engine, Entity, FailurePolicy};
use subgraph_mappings::config::Config;
use subgraph_mappings::snapshot::Snapshot;
use subgraph_mappings::{handler_table, source};

/// Subgraph mapping replay.
#[derive(Debug, Parser)]
#[command(name = "subgraph-mappings", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Apply a trigger file to the stored state.
    Run {
        /// Runtime configuration. Defaults apply if the file is absent.
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,

        /// NDJSON trigger file.
        #[arg(long)]
        events: PathBuf,

        /// Directory holding the state snapshot. Without it nothing is
        /// restored or saved.
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Override the configured network name.
        #[arg(long)]
        network: Option<String>,

        /// Override the configured failure policy (`abort` or `skip`).
        #[arg(long)]
        policy: Option<FailurePolicy>,
    },

    /// List the templates and their handlers.
    Handlers,

    /// Print stored entities as JSON.
    Inspect {
        /// Directory holding the state snapshot.
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Entity type, e.g. `LendingPair`.
        #[arg(long)]
        entity: String,

        /// Only the entity with this id.
        #[arg(long)]
        id: Option<String>,
    },
}

fn main() -> Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            events,
            state_dir,
            network,
            policy,
        } => cmd_run(&config, &events, state_dir.as_deref(), network, policy),
        Command::Handlers => {
            cmd_handlers();
            Ok(())
        }
        Command::Inspect {
            state_dir,
            entity,
            id,
        } => cmd_inspect(&state_dir, &entity, id.as_deref()),
    }
}

/// Execute the `run` subcommand.
fn cmd_run(
    config_path: &Path,
    events: &Path,
    state_dir: Option<&Path>,
    network: Option<String>,
    policy: Option<FailurePolicy>,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let network = network.unwrap_or_else(|| config.network.clone());
    let policy = policy.unwrap_or(config.failure_policy);

    let mut engine = Engine::new(handler_table(), config.chain_client()?)
        .with_network(&network)
        .with_content(config.content_fetcher())
        .with_policy(policy);

    if let Some(dir) = state_dir
        && let Some(snapshot) = Snapshot::load(dir)?
    {
        tracing::info!(
            entities = snapshot.entities.len(),
            data_sources = snapshot.data_sources.len(),
            "restored snapshot"
        );
        engine = engine.with_state(snapshot.into_state());
    }

    for data_source in config.data_sources()? {
        let template = data_source.template.clone();
        let key = data_source.string_param();
        if !engine
            .register_data_source(data_source)
            .with_context(|| format!("registering {template} {key}"))?
        {
            tracing::debug!(template = %template, source = %key, "data source already registered");
        }
    }

    let triggers = source::load(events, engine.cursor())?;
    tracing::info!(
        triggers = triggers.len(),
        network = %network,
        policy = %policy,
        data_sources = engine.registry().len(),
        "starting replay"
    );

    let result = engine
        .process_all(&triggers)
        .and_then(|()| engine.poll_content().map(drop));

    let stats = engine.stats();
    let cursor = engine.cursor();
    if let Some(dir) = state_dir {
        Snapshot::capture(&engine.into_state()).save(dir)?;
    }

    match result {
        Ok(()) => {
            tracing::info!(
                processed = stats.processed,
                ignored = stats.ignored,
                skipped = stats.skipped,
                content = stats.content_processed,
                "replay finished"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                cursor = ?cursor,
                processed = stats.processed,
                error = %e,
                "replay stopped"
            );
            Err(e).context("replay stopped")
        }
    }
}

/// Execute the `handlers` subcommand.
#[allow(clippy::print_stdout, reason = "CLI output")]
fn cmd_handlers() {
    println!("{:<24} HANDLERS", "TEMPLATE");
    println!("{}", "-".repeat(72));

    for (template, set) in handler_table().iter() {
        let mut handlers: Vec<String> = set.event_names().map(ToOwned::to_owned).collect();
        handlers.extend(set.call_names().map(|name| format!("{name}()")));
        if set.block_handler().is_some() {
            handlers.push("<block>".to_owned());
        }
        if set.file_handler().is_some() {
            handlers.push("<file>".to_owned());
        }
        println!("{template:<24} {}", handlers.join(", "));
    }
}

/// Execute the `inspect` subcommand.
#[allow(clippy::print_stdout, reason = "CLI output")]
fn cmd_inspect(state_dir: &Path, entity_type: &str, id: Option<&str>) -> Result<()> {
    let Some(snapshot) = Snapshot::load(state_dir)? else {
        bail!("no snapshot in {}", state_dir.display());
    };

    let entities: Vec<&Entity> = snapshot
        .entities
        .iter()
        .map(|record| &record.entity)
        .filter(|e| e.entity_type() == entity_type)
        .filter(|e| id.is_none_or(|id| e.id() == id))
        .collect();

    if entities.is_empty() {
        tracing::warn!(entity = entity_type, id = ?id, "no matching entities");
    }
    println!("{}", serde_json::to_string_pretty(&entities)?);
    Ok(())
}
