//! mpi-linker - master patient index linker
//!
//! Runs one reconciliation for a changed patient record against a registry
//! snapshot and prints the run report as JSON.
//!
//! ```text
//! mpi-linker --store registry.json --patient incoming.json --event update --write-back
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use mpi_common::config::LinkerConfig;
use mpi_common::PatientRecord;
use mpi_linker::logging;
use mpi_linker::organization::StoreOrganizationResolver;
use mpi_linker::similarity::NameBirthGenderSimilarity;
use mpi_linker::store::{InMemoryStore, RecordStore};
use mpi_linker::{EventKind, ReconciliationOrchestrator};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "mpi-linker", version, about = "Link remote patient records to central master records")]
struct Cli {
    /// Config file (overrides MPI_LINKER_CONFIG and default locations)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Registry snapshot (JSON with `organizations` and `patients`)
    #[arg(long)]
    store: PathBuf,

    /// Changed remote patient record (JSON)
    #[arg(long)]
    patient: PathBuf,

    /// Kind of change that triggered the run
    #[arg(long, value_enum, default_value_t = EventKind::Update)]
    event: EventKind,

    /// Save the snapshot back after the run
    #[arg(long)]
    write_back: bool,

    /// Also print the records linked from each central match
    #[arg(long)]
    show_links: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over the configured level
    let log_level = logging::init();

    let config = LinkerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    log_level
        .apply_configured(&config.logging.level)
        .context("Failed to apply configured log level")?;

    info!("Starting mpi-linker");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        threshold = config.linker.similarity_threshold,
        timeout_ms = config.linker.scoring_timeout_ms,
        commit_mode = ?config.linker.commit_mode,
        central = %config.linker.central_organization,
        "Linker settings"
    );

    let store = Arc::new(
        InMemoryStore::load_snapshot(&cli.store)
            .await
            .with_context(|| format!("Failed to load snapshot {}", cli.store.display()))?,
    );
    let record_store: Arc<dyn RecordStore> = store.clone();

    let organizations = Arc::new(
        StoreOrganizationResolver::load(record_store.clone(), &config.linker.central_organization).await?,
    );
    let scorer = Arc::new(NameBirthGenderSimilarity::new());
    let orchestrator = ReconciliationOrchestrator::new(record_store, organizations, scorer, &config.linker);

    let content = tokio::fs::read_to_string(&cli.patient)
        .await
        .with_context(|| format!("Failed to read {}", cli.patient.display()))?;
    let patient: PatientRecord = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", cli.patient.display()))?;

    let report = orchestrator.handle(&patient, cli.event).await?;

    let mut output = json!({ "report": report });
    if cli.show_links {
        let mut links = Vec::new();
        for central in orchestrator.candidates().find_linked_centrals(&patient).await? {
            let linked = orchestrator.candidates().load_linked_records(&central).await?;
            links.push(json!({
                "central": central.id,
                "linked": linked
                    .iter()
                    .map(|l| json!({
                        "record": l.record.id,
                        "organization": l.organization.as_ref().map(|o| o.id.qualified()),
                    }))
                    .collect::<Vec<_>>(),
            }));
        }
        output["links"] = json!(links);
    }
    println!("{}", serde_json::to_string_pretty(&output)?);

    if cli.write_back {
        store.save_snapshot(&cli.store).await?;
        info!(path = %cli.store.display(), "Snapshot written");
    }

    Ok(())
}
