//! booksing: keep a deduplicated, searchable catalogue of an e-book directory.

mod error;

use crate::error::{ErrorKind, Result};
use booksing_cache::{Database, Repository};
use booksing_config::Config;
use booksing_library::gateway::EpubExtractor;
use booksing_library::{Indexer, IndexerConfig, IndexerHandle, ScanReport};
use booksing_search::{IndexHandle, MemoryIndex, SearchIndex};
use booksing_storage::BackendHandle;
use booksing_storage::backend::{ExtensionFilterBackend, LocalBackend};
use clap::{Parser, Subcommand};
use exn::ResultExt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use time::{Duration, UtcDateTime};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "booksing", version, about = "Scan an e-book directory into a searchable catalogue")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one scan, print its report and exit
    Scan,
    /// Scan now and then on the configured interval, until interrupted
    Run,
    /// Show how the number of stored books changed over time
    History {
        /// How far back to look
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// Scan, then search titles and authors
    Search {
        query: Vec<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    init_logging(&config)?;
    let db = open_database(&config).await?;
    let repo = Repository::from(&db);

    let result = match cli.command {
        Command::Scan => scan(&config, repo).await,
        Command::Run => serve(&config, repo).await,
        Command::History { days } => history(&repo, days).await,
        Command::Search { query, limit } => search(&config, repo, &query.join(" "), limit).await,
    };
    db.close().await;
    result
}

fn init_logging(config: &Config) -> Result<()> {
    let level = config.log.level_filter().or_raise(|| ErrorKind::Config)?;
    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .or_raise(|| ErrorKind::Logging)
}

async fn open_database(config: &Config) -> Result<Database> {
    let path = &config.database.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Database)?;
    }
    tracing::debug!(path = %path.display(), "opening book database");
    Database::connect(path).await.or_raise(|| ErrorKind::Database)
}

fn start_indexer(config: &Config, repo: Repository, index: IndexHandle, timer: bool) -> Result<IndexerHandle> {
    let book_dir = std::path::absolute(&config.library.book_dir).or_raise(|| ErrorKind::Library)?;
    let local: BackendHandle = Arc::new(LocalBackend::new("books", &book_dir).or_raise(|| ErrorKind::Library)?);
    let books: BackendHandle = Arc::new(ExtensionFilterBackend::new(Arc::clone(&local), &config.library.extensions));
    let indexer_config = IndexerConfig {
        workers: config.ingest.workers,
        batch_size: config.ingest.batch_size,
        flush_interval: config.ingest.flush_interval(),
        scan_interval: if timer { config.ingest.scan_interval() } else { None },
        allow_deletes: config.library.allow_deletes,
    };
    tracing::info!(book_dir = %book_dir.display(), workers = indexer_config.workers, "starting indexer");
    let extractor = Arc::new(EpubExtractor::new(local));
    Ok(Indexer::new(books, Arc::new(repo), extractor, index, indexer_config).start())
}

fn print_report(report: &ScanReport) {
    let c = &report.counters;
    println!("scan #{}: {}", report.scan_id, report.status);
    println!(
        "  discovered {}, added {}, unchanged {}, duplicate {}, invalid {}, storage errors {}",
        c.discovered, c.added, c.unchanged, c.duplicate, c.invalid, c.storage_errors,
    );
    if let Some(total) = report.total_books {
        println!("  {total} books stored");
    }
}

async fn scan(config: &Config, repo: Repository) -> Result<()> {
    let handle = start_indexer(config, repo, Arc::new(MemoryIndex::new()), false)?;
    let report = handle.scan().await.or_raise(|| ErrorKind::Indexer);
    handle.shutdown().await;
    print_report(&report?);
    Ok(())
}

async fn serve(config: &Config, repo: Repository) -> Result<()> {
    let handle = start_indexer(config, repo, Arc::new(MemoryIndex::new()), true)?;
    let mut reports = handle.subscribe();
    handle.trigger_scan().await.or_raise(|| ErrorKind::Indexer)?;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    tracing::error!(error = %err, "could not listen for ctrl-c");
                }
                break;
            },
            report = reports.recv() => match report {
                Ok(report) => print_report(&report),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "skipped scan reports");
                },
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    tracing::info!("shutting down");
    handle.shutdown().await;
    println!("{}", handle.metrics().prometheus_format());
    Ok(())
}

async fn history(repo: &Repository, days: i64) -> Result<()> {
    let until = UtcDateTime::now();
    let counts = repo
        .book_count_history(until - Duration::days(days), until)
        .await
        .or_raise(|| ErrorKind::Database)?;
    if counts.is_empty() {
        println!("no book counts recorded in the last {days} days");
    }
    for count in counts {
        println!("{}\t{}", count.counted_at, count.total);
    }
    Ok(())
}

async fn search(config: &Config, repo: Repository, query: &str, limit: usize) -> Result<()> {
    // Seed the in-memory index with everything already stored; the scan adds
    // whatever is new.
    let index = Arc::new(MemoryIndex::new());
    let stored = repo.book_count().await.or_raise(|| ErrorKind::Database)?;
    let books = repo
        .list_recent(usize::try_from(stored).unwrap_or(usize::MAX))
        .await
        .or_raise(|| ErrorKind::Database)?;
    index.add_books(&books).await.or_raise(|| ErrorKind::Search)?;

    let handle = start_indexer(config, repo, index.clone(), false)?;
    let report = handle.scan().await.or_raise(|| ErrorKind::Indexer);
    handle.shutdown().await;
    let report = report?;
    tracing::debug!(scan_id = report.scan_id, status = %report.status, "scan before search finished");

    let result = index.query(query, limit, 0).await.or_raise(|| ErrorKind::Search)?;
    for book in &result.books {
        println!("{} by {}\t{}", book.title, book.author, book.path.display());
    }
    println!("{} of {} matches", result.books.len(), result.total);
    Ok(())
}
