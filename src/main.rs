use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use survey_report_store::models::BackendKind;
use survey_report_store::{
    import, report, storage, IdentityKey, ReportFilter, ReportService, StorageConfig, Submission,
    SubmissionBody,
};

#[derive(Parser)]
#[command(name = "survey-report-store")]
#[command(about = "Monthly institutional survey reports with fiscal-year totals", long_about = None)]
struct Cli {
    /// Storage backend: fs or postgres
    #[arg(long, env = "REPORTS_BACKEND", default_value = "postgres")]
    backend: BackendKind,
    /// Root directory for the fs backend
    #[arg(long, env = "REPORTS_DIR")]
    reports_dir: Option<PathBuf>,
    /// Connection string for the postgres backend
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct KeyArgs {
    #[arg(long)]
    district: String,
    #[arg(long)]
    institution: String,
    #[arg(long)]
    month: String,
    #[arg(long)]
    year: String,
}

impl KeyArgs {
    fn key(&self) -> anyhow::Result<IdentityKey> {
        Ok(IdentityKey::new(
            &self.district,
            &self.institution,
            &self.month,
            &self.year,
        )?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the storage directory or database schema
    InitDb,
    /// Save a report from a JSON payload (file path or - for stdin)
    Submit {
        #[arg(long)]
        payload: PathBuf,
        /// Only overwrite the answer slots present in the payload
        #[arg(long)]
        merge: bool,
    },
    /// Show the resolved answers and cumulative without saving
    Preview {
        #[arg(long)]
        payload: PathBuf,
        #[arg(long)]
        merge: bool,
    },
    /// Fetch one report by its identity
    Get {
        #[command(flatten)]
        key: KeyArgs,
    },
    /// List reports matching any of the given fields
    List {
        #[arg(long)]
        district: Option<String>,
        #[arg(long)]
        institution: Option<String>,
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        year: Option<String>,
    },
    /// List institution names, optionally for one district
    Institutions {
        #[arg(long)]
        district: Option<String>,
    },
    /// Import reports from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        merge: bool,
    },
    /// Write a markdown summary of one report
    Summary {
        #[command(flatten)]
        key: KeyArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Show which storage backend is active
    Info,
}

async fn read_payload(path: &Path) -> anyhow::Result<SubmissionBody> {
    let body = if path == Path::new("-") {
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .context("failed to read payload from stdin")?;
        buffer
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read payload {}", path.display()))?
    };
    serde_json::from_str(&body).context("payload is not a JSON object")
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = StorageConfig::from_settings(cli.backend, cli.reports_dir, cli.database_url)?;
    let store = storage::open(&config)
        .await
        .with_context(|| format!("failed to open {} storage", config.backend()))?;
    let service = ReportService::new(store);
    info!("Using {} storage at {}", config.backend(), service.info().location);

    match cli.command {
        Commands::InitDb => {
            println!("Storage ready at {}.", service.info().location);
        }
        Commands::Submit { payload, merge } => {
            let submission = Submission::from_body(read_payload(&payload).await?, merge)?;
            let saved = service.submit(&submission).await?;
            print_json(&saved.doc)?;
        }
        Commands::Preview { payload, merge } => {
            let submission = Submission::from_body(read_payload(&payload).await?, merge)?;
            let preview = service.preview(&submission).await?;
            print_json(&preview)?;
        }
        Commands::Get { key } => {
            let key = key.key()?;
            match service.get(&key).await? {
                Some(doc) => print_json(&doc)?,
                None => println!("No report found for {key}."),
            }
        }
        Commands::List {
            district,
            institution,
            month,
            year,
        } => {
            let filter = ReportFilter::new(
                district.as_deref(),
                institution.as_deref(),
                month.as_deref(),
                year.as_deref(),
            );
            let reports = service.list(&filter).await?;
            print_json(&reports)?;
        }
        Commands::Institutions { district } => {
            let names = service.institutions(district.as_deref()).await?;
            print_json(&names)?;
        }
        Commands::Import { csv, merge } => {
            let summary = import::import_csv(&service, &csv, merge).await?;
            println!(
                "Imported {} reports from {} ({} skipped).",
                summary.written,
                csv.display(),
                summary.skipped
            );
        }
        Commands::Summary { key, out } => {
            let key = key.key()?;
            let Some(doc) = service.get(&key).await? else {
                println!("No report found for {key}.");
                return Ok(());
            };
            std::fs::write(&out, report::build_summary(&doc))?;
            println!("Summary written to {}.", out.display());
        }
        Commands::Info => {
            print_json(&service.info())?;
        }
    }

    Ok(())
}
