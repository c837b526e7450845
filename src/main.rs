use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use vocational_scraper::app::ports::{HttpClientPort, RateLimiterPort};
use vocational_scraper::config::Config;
use vocational_scraper::db::SqliteStorage;
use vocational_scraper::infra::http_client::{ReqwestHttp, RetryingHttp};
use vocational_scraper::infra::rate_limiter_adapter::RateLimiterAdapter;
use vocational_scraper::logging;
use vocational_scraper::metrics::init_metrics;
use vocational_scraper::pipeline::{PipelineSettings, ScrapePipeline};
use vocational_scraper::rate_limiter::RateLimiter;
use vocational_scraper::storage::{InMemoryStorage, Storage};
use vocational_scraper::types::SchoolOutcome;

#[derive(Parser)]
#[command(name = "vocational_scraper")]
#[command(about = "Vocational-school independent enrollment score scraper")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the listing and every school's score table into the database
    Run {
        /// Config file (defaults to ./config.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// SQLite database path
        #[arg(long)]
        db: Option<PathBuf>,
        /// Listing page URL
        #[arg(long)]
        listing_url: Option<String>,
        /// Year stamped on every score row
        #[arg(long)]
        year: Option<i32>,
        /// Insert each school's rows in a single transaction
        #[arg(long)]
        atomic: bool,
        /// Keep everything in memory; nothing is written to disk
        #[arg(long)]
        dry_run: bool,
    },
    /// Create the school_info and score tables
    InitDb {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print dashboard rows as JSON lines
    Dump {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Maximum number of rows to print
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn load_config(path: Option<&Path>, db: Option<PathBuf>) -> anyhow::Result<Config> {
    let mut config = Config::load(path).context("loading configuration")?;
    if let Some(db) = db {
        config.database.path = db;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _guard = logging::init_logging(Path::new("logs"));

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            db,
            listing_url,
            year,
            atomic,
            dry_run,
        } => {
            let mut config = load_config(config.as_deref(), db)?;
            if let Some(url) = listing_url {
                config.scraper.listing_url = url;
            }
            if let Some(year) = year {
                config.scraper.capture_year = year;
            }
            if atomic {
                config.scraper.atomic_school_inserts = true;
            }
            config.validate()?;

            if let Some(addr) = config.metrics.listen_addr.as_deref() {
                init_metrics(addr);
            }

            let storage: Arc<dyn Storage> = if dry_run {
                println!("🧪 Dry run: results stay in memory");
                Arc::new(InMemoryStorage::new())
            } else {
                Arc::new(SqliteStorage::open(&config.database.path).with_context(|| {
                    format!("opening database {}", config.database.path.display())
                })?)
            };

            run(&config, storage).await?;
        }
        Commands::InitDb { config, db } => {
            let config = load_config(config.as_deref(), db)?;
            // Opening runs the migrations
            SqliteStorage::open(&config.database.path)?;
            println!("✅ Database ready at {}", config.database.path.display());
        }
        Commands::Dump { config, db, limit } => {
            let config = load_config(config.as_deref(), db)?;
            let storage = SqliteStorage::open(&config.database.path)?;
            let rows = storage.dashboard_rows().await?;
            for row in rows.iter().take(limit.unwrap_or(usize::MAX)) {
                println!("{}", serde_json::to_string(row)?);
            }
        }
    }
    Ok(())
}

async fn run(config: &Config, storage: Arc<dyn Storage>) -> anyhow::Result<()> {
    let scraper = &config.scraper;
    let listing_http: Arc<dyn HttpClientPort> = Arc::new(ReqwestHttp::new(&scraper.user_agent)?);
    let detail_http: Arc<dyn HttpClientPort> = Arc::new(RetryingHttp::new(
        ReqwestHttp::new(&scraper.user_agent)?,
        scraper.detail_retries,
        scraper.retry_backoff(),
    ));
    let limiter: Arc<dyn RateLimiterPort> =
        Arc::new(RateLimiterAdapter(RateLimiter::with_interval(scraper.delay())));

    let pipeline = ScrapePipeline::new(
        listing_http,
        storage.clone(),
        limiter,
        PipelineSettings::from(scraper),
    )
    .with_detail_http(detail_http);

    println!("🚀 Scraping {}", scraper.listing_url);
    let result = match pipeline.run().await {
        Ok(result) => result,
        Err(e) => {
            error!("Scrape aborted: {}", e);
            println!("❌ Scrape aborted: {}", e);
            return Err(e.into());
        }
    };

    info!(run_id = %result.run_id, "Pipeline finished");
    println!("\n📊 Scrape results (run {}):", result.run_id);
    println!("   Schools: {}", result.total_schools);
    println!("   Persisted: {}", result.persisted);
    println!("   No score link: {}", result.no_score_link);
    println!("   No score table: {}", result.skipped_no_table);
    println!("   Fetch failed: {}", result.skipped_fetch_failed);
    println!("   Persist failed: {}", result.persist_failed);
    println!("   Score rows inserted: {}", result.rows_accepted);
    println!("   Rows skipped (shape mismatch): {}", result.rows_skipped_shape_mismatch);
    println!("   Row insert failures: {}", result.row_insert_failures);

    let failed: Vec<_> = result
        .schools
        .iter()
        .filter_map(|s| match &s.outcome {
            SchoolOutcome::SkippedFetchFailed { error } | SchoolOutcome::PersistFailed { error } => {
                Some((s.name.as_str(), error.as_str()))
            }
            _ => None,
        })
        .collect();
    if !failed.is_empty() {
        warn!("{} schools failed during the run", failed.len());
        println!("\n⚠️  Failed schools:");
        for (name, error) in failed {
            println!("   - {}: {}", name, error);
        }
    }

    let (schools, scores) = storage.counts().await?;
    println!("\n🗄️  Store now holds {} schools and {} score rows", schools, scores);
    Ok(())
}
