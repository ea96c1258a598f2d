//! VitalSync - offline-first telemetry engine.
//!
//! Run with: `cargo run -p vitalsync-service -- run`

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use vitalsync_core::is_recognized_sensor;
use vitalsync_service::{Config, Engine};
use vitalsync_types::{HistoryRange, Reading};

/// VitalSync - record, queue and deliver wearable telemetry.
#[derive(Parser, Debug)]
#[command(name = "vitalsync")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the periodic flush worker until interrupted.
    Run,

    /// Decode a captured broadcast and record its readings.
    Ingest {
        /// Service identifier the payload was advertised under.
        #[arg(long)]
        id: String,

        /// Payload bytes as hex.
        #[arg(long)]
        hex: String,

        /// Advertised device name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Record a single reading.
    Record {
        /// Vital type (e.g. temperature, heart_rate).
        vital_type: String,

        /// Observed value.
        value: f64,

        /// Unit of measure.
        #[arg(long)]
        unit: Option<String>,

        /// Observation time as RFC 3339 (defaults to now).
        #[arg(long)]
        at: Option<String>,
    },

    /// Run one flush cycle.
    Flush,

    /// Show the reconciled series for a vital type.
    History {
        /// Vital type.
        vital_type: String,

        /// Lookback window: 24h, 7d or 30d.
        #[arg(long, default_value = "24h")]
        range: HistoryRange,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show queue state.
    Status,

    /// Export stored records.
    Export {
        /// Output format.
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,

        /// Only export this vital type.
        #[arg(long = "type")]
        vital_type: Option<String>,

        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import records from a JSON export.
    Import {
        /// JSON file produced by `export --format json`.
        file: PathBuf,
    },

    /// Delete stored records.
    Clear {
        /// Only delete this vital type.
        #[arg(long = "type")]
        vital_type: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vitalsync_service=info".parse()?)
                .add_directive("vitalsync_core=info".parse()?)
                .add_directive("vitalsync_store=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }

    info!("Opening database at {:?}", config.storage.path);
    let engine = Engine::from_config(config)?;

    match args.command {
        Command::Run => run(&engine).await,
        Command::Ingest { id, hex, name } => ingest(&engine, id, &hex, name.as_deref()).await,
        Command::Record {
            vital_type,
            value,
            unit,
            at,
        } => record(&engine, vital_type, value, unit, at.as_deref()).await,
        Command::Flush => {
            let outcome = engine.sync_now().await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Command::History {
            vital_type,
            range,
            json,
        } => history(&engine, &vital_type, range, json).await,
        Command::Status => {
            let status = engine.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Command::Export {
            format,
            vital_type,
            output,
        } => export(&engine, format, vital_type.as_deref(), output).await,
        Command::Import { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let result = engine.context().store.lock().await.import_json(&json)?;
            println!(
                "Imported {} of {} record(s), {} evicted by retention",
                result.imported, result.total, result.evicted
            );
            Ok(())
        }
        Command::Clear { vital_type } => {
            let removed = engine
                .context()
                .store
                .lock()
                .await
                .clear(vital_type.as_deref())?;
            println!("Deleted {} record(s)", removed);
            Ok(())
        }
    }
}

async fn run(engine: &Engine) -> anyhow::Result<()> {
    engine
        .recover_in_flight()
        .await
        .context("Failed to recover interrupted records")?;
    engine.start();
    info!("Flush worker running, press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received, stopping flush worker");
    engine.dispose().await;
    Ok(())
}

async fn ingest(
    engine: &Engine,
    id: String,
    payload_hex: &str,
    name: Option<&str>,
) -> anyhow::Result<()> {
    let payload = hex::decode(payload_hex.trim()).context("Payload is not valid hex")?;
    let mut service_data = HashMap::new();
    service_data.insert(id, payload);

    if !is_recognized_sensor(&service_data, name) {
        warn!("Advertisement does not look like a supported sensor");
    }

    let records = engine
        .record_advertisement(&service_data, OffsetDateTime::now_utc())
        .await?;
    if records.is_empty() {
        println!("No readings decoded");
    }
    for record in records {
        println!(
            "{} {} = {}{}",
            record.id,
            record.vital_type,
            record.value,
            record.unit.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn record(
    engine: &Engine,
    vital_type: String,
    value: f64,
    unit: Option<String>,
    at: Option<&str>,
) -> anyhow::Result<()> {
    let timestamp = match at {
        Some(text) => OffsetDateTime::parse(text, &Rfc3339)
            .with_context(|| format!("Invalid timestamp '{}'", text))?,
        None => OffsetDateTime::now_utc(),
    };

    let mut reading = Reading::new(vital_type, value, timestamp);
    if let Some(unit) = unit {
        reading = reading.with_unit(unit);
    }

    let stored = engine.record(&reading).await?;
    println!("Recorded {} as record {}", stored.vital_type, stored.id);
    Ok(())
}

async fn history(
    engine: &Engine,
    vital_type: &str,
    range: HistoryRange,
    json: bool,
) -> anyhow::Result<()> {
    let series = engine.history(vital_type, range).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&series)?);
        return Ok(());
    }

    if series.is_empty() {
        println!("No {} data in the last {}", vital_type, range);
        return Ok(());
    }
    for point in series {
        let timestamp = point.timestamp.format(&Rfc3339)?;
        println!("{}  {:>10}  {:?}", timestamp, point.value, point.source);
    }
    Ok(())
}

async fn export(
    engine: &Engine,
    format: ExportFormat,
    vital_type: Option<&str>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let content = {
        let store = engine.context().store.lock().await;
        match format {
            ExportFormat::Csv => store.export_csv(vital_type)?,
            ExportFormat::Json => store.export_json(vital_type)?,
        }
    };

    match output {
        Some(path) => {
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Exported records to {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}
