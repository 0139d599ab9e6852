//! folio: reconstruct and inspect portfolio valuation histories.
//!
//! Commands:
//! - `reconstruct`: run the pipeline over a broker timeline export and a positions snapshot
//! - `show`: print a cached user history and its adjustment log

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use portfolio_history_core::models::report::{Stage, SyncReport};
use portfolio_history_core::models::settings::Settings;
use portfolio_history_core::models::snapshot::PortfolioSnapshot;
use portfolio_history_core::models::transaction::RawTransaction;
use portfolio_history_core::providers::registry::PriceProviderRegistry;
use portfolio_history_core::providers::symbols::SymbolResolver;
use portfolio_history_core::storage::cache_store::CacheStore;
use portfolio_history_core::PortfolioHistory;

#[derive(Parser)]
#[command(name = "folio", about = "Portfolio history reconstruction from a broker transaction log")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct the valuation history from exported JSON files.
    Reconstruct {
        /// Timeline export: a JSON array of transaction records.
        #[arg(long)]
        transactions: PathBuf,

        /// Current positions snapshot (JSON).
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Valuation date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        as_of: Option<String>,

        /// Settings file (JSON). Missing fields use defaults.
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Account currency override (e.g. EUR).
        #[arg(long)]
        currency: Option<String>,

        /// No network access: only execution prices and cached closes.
        #[arg(long, default_value_t = false)]
        offline: bool,

        /// Persist into this user's cache (requires --cache-dir).
        #[arg(long)]
        user: Option<String>,

        /// Cache directory.
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Print the full history and report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print a cached user history.
    Show {
        #[arg(long)]
        user: String,

        #[arg(long, default_value = "cache")]
        cache_dir: PathBuf,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Reconstruct {
            transactions,
            snapshot,
            as_of,
            settings,
            currency,
            offline,
            user,
            cache_dir,
            json,
        } => {
            let mut settings = match settings {
                Some(path) => Settings::load(&path)
                    .with_context(|| format!("reading settings {}", path.display()))?,
                None => Settings::default(),
            };
            if let Some(currency) = currency {
                settings.account_currency = currency;
            }
            let as_of = parse_date(as_of.as_deref())?;
            run_reconstruct(
                &transactions,
                snapshot.as_deref(),
                as_of,
                settings,
                offline,
                user,
                cache_dir,
                json,
            )
            .await
        }
        Commands::Show {
            user,
            cache_dir,
            json,
        } => run_show(&user, cache_dir, json),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_reconstruct(
    transactions: &Path,
    snapshot: Option<&Path>,
    as_of: NaiveDate,
    settings: Settings,
    offline: bool,
    user: Option<String>,
    cache_dir: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let items = read_transactions(transactions)?;
    let snapshot = snapshot.map(read_snapshot).transpose()?;

    let mut history = match (user, cache_dir) {
        (Some(user), Some(dir)) => PortfolioHistory::open(CacheStore::new(dir), &user, settings)?,
        (None, None) => PortfolioHistory::new("local", settings)?,
        _ => bail!("--user and --cache-dir must be given together"),
    };
    if offline {
        history = history.with_registry(PriceProviderRegistry::new(), SymbolResolver::offline());
    }

    let added = history.merge_transactions(items);
    tracing::info!(added, total = history.transactions().len(), "transactions loaded");

    let report = history.recalculate(snapshot, as_of).await?;

    if json {
        let out = serde_json::json!({
            "report": report,
            "history": history.history(),
            "performance": history.performance(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_report(&report);
        if let Some(last) = history.history().last() {
            println!(
                "Value on {}: {:.2} {} (invested {:.2})",
                last.date,
                last.value,
                history.settings().currency(),
                last.invested
            );
        }
    }
    Ok(())
}

fn run_show(user: &str, cache_dir: PathBuf, json: bool) -> Result<()> {
    let store = CacheStore::new(cache_dir);
    let Some(cache) = store.load(user)? else {
        bail!("no cache for user '{user}' in {}", store.dir().display());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&cache)?);
        return Ok(());
    }

    println!("User:          {}", cache.user_id);
    match cache.last_sync {
        Some(ts) => println!("Last sync:     {}", ts.format("%Y-%m-%d %H:%M UTC")),
        None => println!("Last sync:     never"),
    }
    println!("Transactions:  {}", cache.transactions.len());
    println!("History:       {} points", cache.history.len());
    if let (Some(first), Some(last)) = (cache.history.first(), cache.history.last()) {
        println!("  {} → {}", first.date, last.date);
        println!("  value {:.2}, invested {:.2}", last.value, last.invested);
    }
    if let Some(twr) = cache.performance.as_ref().and_then(|p| p.twr.last()) {
        println!("TWR:           {twr:+.2}%");
    }
    println!("Cached prices: {}", cache.price_cache.total_entries());

    println!("Adjustments:   {}", cache.adjustment_log.len());
    for record in &cache.adjustment_log {
        println!(
            "  {}  {}  (computed {:.6}, broker {:.6})",
            record.recorded_at.format("%Y-%m-%d"),
            record.adjustment,
            record.computed_quantity,
            record.ground_truth_quantity
        );
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    let s = &report.summary;
    println!("Run {}", report.run_id);
    println!(
        "Transactions:  {} total, {} classified, {} unmatched, {} low confidence",
        s.total_transactions, s.classified, s.unmatched, s.low_confidence
    );
    println!(
        "Instruments:   {} ({} priced from trades, {} external, {} unpriced)",
        s.instruments, s.priced_from_transactions, s.priced_externally, s.unpriced
    );
    println!(
        "Skipped:       {} classification, {} holdings, {} prices, {} valuation",
        s.skipped_in(Stage::Classification),
        s.skipped_in(Stage::Holdings),
        s.skipped_in(Stage::Prices),
        s.skipped_in(Stage::Valuation)
    );
    if let Some(gap) = s.cash_gap {
        println!("Cash gap:      {gap:+.2}");
    }
    for adjustment in &report.adjustments {
        println!("Adjustment:    {adjustment}");
    }
    for residual in &s.residuals {
        println!(
            "Residual:      {} computed {:.6} vs broker {:.6}",
            residual.isin, residual.computed, residual.ground_truth
        );
    }
    let m = &report.metrics;
    println!(
        "Performance:   TWR {:+.2}%, annualised {:+.2}%, max drawdown {:.2}%, volatility {:.2}%",
        m.total_return, m.annualized_return, m.max_drawdown, m.volatility
    );
    println!("Points:        {}", report.points);
}

fn read_transactions(path: &Path) -> Result<Vec<RawTransaction>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading transactions {}", path.display()))?;
    // A `null` export is an empty timeline.
    let items: Option<Vec<RawTransaction>> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing transactions {}", path.display()))?;
    Ok(items.unwrap_or_default())
}

fn read_snapshot(path: &Path) -> Result<PortfolioSnapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing snapshot {}", path.display()))
}

fn parse_date(raw: Option<&str>) -> Result<NaiveDate> {
    match raw {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD")),
        None => Ok(Utc::now().date_naive()),
    }
}
