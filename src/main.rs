use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use leaguesync::config::{self, StoreBackend};
use leaguesync::document;
use leaguesync::rest_store::RestStore;
use leaguesync::sqlite_store::SqliteStore;
use leaguesync::store::Store;
use leaguesync::sync::run_sync;

const DEFAULT_INPUT: &str = "league_data.json";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = config::load()?;

    let input = parse_input_arg().unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT));
    let doc = document::load_document(&input)?;
    println!("Loaded {}", input.display());
    println!(
        "  seasons={} teams={} team match results={}",
        doc.seasons.len(),
        doc.all_teams.len(),
        doc.team_match_results.len()
    );

    let mut store: Box<dyn Store> = match &cfg.backend {
        StoreBackend::Sqlite(path) => {
            println!("Store: sqlite {}", path.display());
            Box::new(SqliteStore::open(path)?)
        }
        StoreBackend::Rest { base_url, api_key } => {
            println!("Store: rest {base_url}");
            Box::new(RestStore::new(base_url, api_key))
        }
    };

    let summary = run_sync(store.as_mut(), &doc, &cfg.sync).context("sync run failed")?;

    println!("Sync complete");
    println!("  inserted:              {}", summary.inserted);
    println!("  updated:               {}", summary.updated);
    println!("  skipped (invalid):     {}", summary.skipped_invalid);
    println!("  skipped (no parent):   {}", summary.skipped_missing_parent);
    println!("  skipped (error):       {}", summary.skipped_error);
    println!("  winners attached:      {}", summary.winners_attached);
    println!("  unresolved winners:    {}", summary.unresolved_winners);
    if !summary.errors.is_empty() {
        println!("  errors: {}", summary.errors.len());
        for err in summary.errors.iter().take(6) {
            println!("   - {err}");
        }
    }

    Ok(())
}

fn parse_input_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--input=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--input" {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}
