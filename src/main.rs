//! CLI entry point for the acquisition and extraction pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use tracing_subscriber::EnvFilter;

use edgaracquire::config::{Config, Settings};
use edgaracquire::export;
use edgaracquire::llm::{ChatClient, ExecutiveExtractor, SectionLocator};
use edgaracquire::models::normalize_cik;
use edgaracquire::repository::{
    create_pool, migrations, DieselCompanyRepository, DieselExtractionRepository,
    DieselFilingRepository,
};
use edgaracquire::scrapers::{
    EdgarClient, FilingArchive, HttpClient, RateLimitConfig, RateLimiter,
};
use edgaracquire::services::{
    DownloadConfig, DownloadService, ExtractConfig, ExtractionService,
};
use edgaracquire::validate::FilingValidator;

#[derive(Parser)]
#[command(name = "edgar", version, about = "Acquire proxy statements and extract executive compensation data")]
struct Cli {
    /// Config file path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config file).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh the company registry from the archive's ticker file.
    Companies,
    /// Download and validate filings for companies.
    Download {
        /// Specific CIKs to process; defaults to every known company.
        #[arg(long, value_delimiter = ',')]
        ciks: Vec<String>,
        /// Filings to list per company.
        #[arg(long, default_value_t = 5)]
        limit: usize,
        /// Concurrent download workers.
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
    /// Extract executive records from validated filings.
    Extract {
        /// Concurrent extraction workers.
        #[arg(long, default_value_t = 2)]
        concurrency: usize,
        /// Process every validated filing, not only the latest per company.
        #[arg(long)]
        all_filings: bool,
    },
    /// Export extracted executives to CSV.
    Export {
        /// Output file path.
        #[arg(long, default_value = "executives.csv")]
        output: PathBuf,
    },
    /// Show per-state counts for both pipeline stages.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("edgaracquire=info,edgar=info")
        }))
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    settings.ensure_directories()?;

    let pool = create_pool(&settings.database_path())
        .context("failed to open the progress database")?;
    migrations::run_migrations(pool.clone()).await?;

    match cli.command {
        Command::Companies => companies(&settings, pool).await,
        Command::Download {
            ciks,
            limit,
            workers,
        } => download(&settings, pool, ciks, limit, workers).await,
        Command::Extract {
            concurrency,
            all_filings,
        } => extract(&settings, pool, concurrency, all_filings).await,
        Command::Export { output } => export_csv(pool, &output).await,
        Command::Status => status(pool).await,
    }
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = match &cli.data_dir {
        Some(dir) => Settings::with_data_dir(dir.clone()),
        None => Settings::default(),
    };
    if let Some(path) = &cli.config {
        settings = settings.apply(Config::load(path)?);
    } else {
        let default_path = settings.data_dir.join("config.toml");
        settings = settings.apply(Config::load(&default_path)?);
    }
    Ok(settings.load_env())
}

fn build_archive(settings: &Settings) -> anyhow::Result<Arc<dyn FilingArchive>> {
    if settings.contact_email.is_empty() {
        bail!("the archive requires a contact email: set SEC_CONTACT_EMAIL or contact_email in config.toml");
    }
    let limiter = RateLimiter::with_config(RateLimitConfig {
        min_interval: Duration::from_millis(settings.request_delay_ms),
        ..Default::default()
    });
    let http = HttpClient::new(
        &settings.contact_email,
        Duration::from_secs(settings.request_timeout),
        limiter,
        settings.max_retries,
    );
    Ok(Arc::new(EdgarClient::new(http)))
}

async fn companies(
    settings: &Settings,
    pool: edgaracquire::repository::SqlitePool,
) -> anyhow::Result<()> {
    let archive = build_archive(settings)?;
    let repo = DieselCompanyRepository::new(pool);

    let spinner = ProgressBar::new_spinner().with_message("fetching company registry");
    spinner.enable_steady_tick(Duration::from_millis(120));
    let entries = archive.company_tickers().await?;
    let loaded = repo.upsert_names(entries).await?;
    spinner.finish_and_clear();

    println!("Loaded {loaded} companies ({} known)", repo.count().await?);
    Ok(())
}

async fn download(
    settings: &Settings,
    pool: edgaracquire::repository::SqlitePool,
    ciks: Vec<String>,
    limit: usize,
    workers: usize,
) -> anyhow::Result<()> {
    let archive = build_archive(settings)?;
    let companies = DieselCompanyRepository::new(pool.clone());
    let filings = DieselFilingRepository::new(pool);

    let ciks: Vec<String> = if ciks.is_empty() {
        companies
            .get_all()
            .await?
            .into_iter()
            .map(|c| c.cik)
            .collect()
    } else {
        ciks.iter().map(|c| normalize_cik(c)).collect()
    };
    if ciks.is_empty() {
        bail!("no companies to process: run `edgar companies` first or pass --ciks");
    }

    let service = DownloadService::new(
        archive,
        companies,
        filings,
        FilingValidator::new(),
        settings.documents_dir.clone(),
        DownloadConfig {
            filings_per_company: limit,
            workers,
            max_retries: settings.max_retries,
            ..Default::default()
        },
    );

    let spinner = ProgressBar::new_spinner()
        .with_message(format!("downloading filings for {} companies", ciks.len()));
    spinner.enable_steady_tick(Duration::from_millis(120));
    let summary = service.run(&ciks).await?;
    spinner.finish_and_clear();

    println!(
        "Companies: {}  discovered: {}  validated: {}  rejected: {}  failed: {}  skipped: {}",
        summary.companies,
        summary.discovered,
        summary.validated,
        summary.rejected,
        summary.failed,
        summary.skipped,
    );
    Ok(())
}

async fn extract(
    settings: &Settings,
    pool: edgaracquire::repository::SqlitePool,
    concurrency: usize,
    all_filings: bool,
) -> anyhow::Result<()> {
    let model = Arc::new(ChatClient::new(settings.llm.clone()));
    let filings = DieselFilingRepository::new(pool.clone());
    let ledger = DieselExtractionRepository::new(pool);

    let service = ExtractionService::new(
        filings,
        ledger,
        SectionLocator::new(model.clone()),
        ExecutiveExtractor::new(model),
        ExtractConfig {
            concurrency,
            all_filings,
            ..Default::default()
        },
    );

    let summary = service.run().await?;
    println!(
        "Candidates: {}  succeeded: {}  retryable: {}  permanent: {}  skipped: {}  executives: {}",
        summary.candidates,
        summary.succeeded,
        summary.failed_retryable,
        summary.failed_permanent,
        summary.skipped,
        summary.executives,
    );
    Ok(())
}

async fn export_csv(
    pool: edgaracquire::repository::SqlitePool,
    output: &PathBuf,
) -> anyhow::Result<()> {
    let ledger = DieselExtractionRepository::new(pool);
    let rows = ledger.export_rows().await?;
    if rows.is_empty() {
        println!("No executive data to export");
        return Ok(());
    }
    let written = export::write_csv(&rows, output)?;
    println!("Wrote {written} executives to {}", output.display());
    Ok(())
}

async fn status(pool: edgaracquire::repository::SqlitePool) -> anyhow::Result<()> {
    let filings = DieselFilingRepository::new(pool.clone());
    let ledger = DieselExtractionRepository::new(pool.clone());
    let companies = DieselCompanyRepository::new(pool);

    println!("Companies: {}", companies.count().await?);

    println!("Filings:");
    let mut counts: Vec<_> = filings.counts_by_status().await?.into_iter().collect();
    counts.sort();
    for (state, count) in counts {
        println!("  {state}: {count}");
    }

    println!("Extraction:");
    let mut counts: Vec<_> = ledger.counts_by_state().await?.into_iter().collect();
    counts.sort();
    for (state, count) in counts {
        println!("  {state}: {count}");
    }
    Ok(())
}
