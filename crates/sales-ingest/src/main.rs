//! Sales Ingest - game sales import tool

use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use clap::Parser;
use sales_common::logging::{init_logging, LogConfig, LogLevel};
use sales_common::{parse_sale_timestamp, ImportJob, ImportStatus, SalesFilter};
use sales_ingest::{
    generate, DirectLoader, IngestConfig, IngestService, MemoryStore, ReportService, SalesStore,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "sales-ingest")]
#[command(author, version, about = "Game sales CSV import tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Import CSV files through the validating batch pipeline
    Import {
        /// Files to import; each becomes its own job
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Load a CSV file in one shot, without per-row validation
    Load {
        file: PathBuf,
    },

    /// List stored sales
    List {
        /// Earliest sale date (yyyy-MM-dd HH:mm:ss)
        #[arg(long, value_parser = parse_timestamp, requires = "to")]
        from: Option<NaiveDateTime>,

        /// Latest sale date (yyyy-MM-dd HH:mm:ss)
        #[arg(long, value_parser = parse_timestamp, requires = "from")]
        to: Option<NaiveDateTime>,

        #[arg(long)]
        min_price: Option<BigDecimal>,

        #[arg(long)]
        max_price: Option<BigDecimal>,

        /// Zero-based page number
        #[arg(long, default_value_t = 0)]
        page: u32,

        /// Page size, at most 100
        #[arg(long, default_value_t = 100)]
        size: u32,
    },

    /// Sales count and total per sale date
    Report {
        #[arg(long, value_parser = parse_timestamp)]
        from: NaiveDateTime,

        #[arg(long, value_parser = parse_timestamp)]
        to: NaiveDateTime,

        /// Restrict to one game number
        #[arg(long)]
        game_no: Option<i32>,
    },

    /// Show one import job
    Job {
        id: Uuid,
    },

    /// List import jobs, most recent first
    Jobs,

    /// Write a sample sales file
    Generate {
        /// Output file
        output: PathBuf,

        /// Number of data rows
        #[arg(short, long, default_value_t = 1000)]
        rows: u64,

        /// Seed for reproducible output
        #[arg(short, long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("sales-ingest")
        .build()
        .with_env_overrides()?;

    let _log_guard = init_logging(&log_config)?;

    run(cli.command).await
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Import { files } => {
            let (config, store) = connect().await?;
            let service = IngestService::new(config, store)?;
            info!(files = files.len(), "Importing sales files");

            let runs = files.iter().map(|path| import_file(&service, path));
            let jobs = futures::future::try_join_all(runs).await?;
            print_json(&jobs)?;
            ensure_completed(&jobs)?;
        },
        Command::Load { file } => {
            let (config, store) = connect().await?;
            let loader = DirectLoader::new(store, config.import_actor);
            let job = loader.load(&file, &file_name(&file)).await;
            print_json(&job)?;
            ensure_completed(std::slice::from_ref(&job))?;
        },
        Command::List {
            from,
            to,
            min_price,
            max_price,
            page,
            size,
        } => {
            let mut filter = SalesFilter::new();
            if let (Some(from), Some(to)) = (from, to) {
                filter = filter.with_date_range(from, to);
            }
            filter.min_price = min_price;
            filter.max_price = max_price;

            let (_, store) = connect().await?;
            let sales = ReportService::new(store).list_sales(&filter, page, size).await?;
            print_json(&sales)?;
        },
        Command::Report { from, to, game_no } => {
            let (_, store) = connect().await?;
            let totals = ReportService::new(store).sales_totals(from, to, game_no).await?;
            print_json(&totals)?;
        },
        Command::Job { id } => {
            let (_, store) = connect().await?;
            match store.get_job(id).await? {
                Some(job) => print_json(&job)?,
                None => anyhow::bail!("Import job {} not found", id),
            }
        },
        Command::Jobs => {
            let (_, store) = connect().await?;
            print_json(&store.list_jobs().await?)?;
        },
        // Needs neither configuration nor a store
        Command::Generate { output, rows, seed } => {
            let file = std::fs::File::create(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let written = generate(std::io::BufWriter::new(file), rows, seed)?;
            info!(rows = written, path = %output.display(), "Sample file written");
        },
    }

    Ok(())
}

async fn connect() -> Result<(IngestConfig, Arc<dyn SalesStore>)> {
    let config = IngestConfig::load().context("Invalid configuration")?;
    let store = open_store(&config).await?;
    Ok((config, store))
}

#[cfg(feature = "database")]
async fn open_store(config: &IngestConfig) -> Result<Arc<dyn SalesStore>> {
    if config.database.url.is_none() {
        return Ok(memory_store(config));
    }

    let store = sales_ingest::PgStore::connect(&config.database)
        .await
        .context("Failed to connect to the sales database")?;
    store.migrate().await.context("Failed to migrate the sales database")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "database"))]
async fn open_store(config: &IngestConfig) -> Result<Arc<dyn SalesStore>> {
    Ok(memory_store(config))
}

fn memory_store(config: &IngestConfig) -> Arc<dyn SalesStore> {
    warn!("No database configured, writing to an in-memory store");
    Arc::new(MemoryStore::new().with_max_connections(config.database.max_connections))
}

async fn import_file(service: &IngestService, path: &Path) -> Result<ImportJob> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(service.run(file, &file_name(path)).await)
}

fn ensure_completed(jobs: &[ImportJob]) -> Result<()> {
    let failed = jobs
        .iter()
        .filter(|job| job.status != ImportStatus::Completed)
        .count();
    if failed > 0 {
        anyhow::bail!("{} of {} import jobs failed", failed, jobs.len());
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn parse_timestamp(value: &str) -> std::result::Result<NaiveDateTime, String> {
    parse_sale_timestamp(value).map_err(|e| e.to_string())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_needs_no_configuration() {
        // Any command that loads the configuration would fail on this
        std::env::set_var("SALES_BATCH_SIZE", "0");
        assert!(IngestConfig::load().is_err());

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("sample.csv");
        let cli = Cli::try_parse_from([
            "sales-ingest",
            "generate",
            output.to_str().unwrap(),
            "--rows",
            "3",
            "--seed",
            "1",
        ])
        .unwrap();

        run(cli.command).await.unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert_eq!(written.lines().count(), 4);
        assert!(written.starts_with("id,game_no,game_name"));

        let err = run(Command::Jobs).await.unwrap_err();
        assert!(format!("{err:#}").contains("SALES_BATCH_SIZE"));
    }
}
