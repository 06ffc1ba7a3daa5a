use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;

use crate::store::VenueRecord;
use crate::sync::SyncOptions;

pub const DEFAULT_MATCH_BATCH_SIZE: usize = 100;
/// Recorded as a season's start when the scraped date is unparsable.
pub const DEFAULT_FALLBACK_SEASON_START: &str = "2020-01-01";

const CACHE_DIR: &str = "leaguesync";
const DB_FILE: &str = "league.sqlite";

#[derive(Debug, Clone)]
pub enum StoreBackend {
    Sqlite(PathBuf),
    Rest { base_url: String, api_key: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: StoreBackend,
    pub sync: SyncOptions,
}

/// Read configuration from the environment (and `.env` if present). This is
/// the only place a run can fail before any store write: a REST backend
/// without credentials or an unparsable override aborts here.
pub fn load() -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let backend = match env_nonempty("LEAGUESYNC_REST_URL") {
        Some(base_url) => {
            let api_key = env_nonempty("LEAGUESYNC_REST_KEY")
                .ok_or_else(|| anyhow!("LEAGUESYNC_REST_KEY not set for REST backend"))?;
            StoreBackend::Rest { base_url, api_key }
        }
        None => {
            let path = env_nonempty("LEAGUESYNC_DB")
                .map(PathBuf::from)
                .or_else(default_db_path)
                .context("unable to resolve sqlite path")?;
            StoreBackend::Sqlite(path)
        }
    };

    let fallback_raw = env_nonempty("LEAGUESYNC_SEASON_START_FALLBACK")
        .unwrap_or_else(|| DEFAULT_FALLBACK_SEASON_START.to_string());
    let fallback_season_start = NaiveDate::parse_from_str(&fallback_raw, "%Y-%m-%d")
        .with_context(|| format!("bad LEAGUESYNC_SEASON_START_FALLBACK {fallback_raw:?}"))?;

    let match_batch_size = parse_batch_size(env_nonempty("LEAGUESYNC_BATCH_SIZE"))?;

    Ok(AppConfig {
        backend,
        sync: SyncOptions {
            venue: venue_from_env(),
            fallback_season_start,
            match_batch_size,
        },
    })
}

/// The venue is an external_id-less singleton; its seed comes from config
/// with the original deployment as defaults.
fn venue_from_env() -> VenueRecord {
    VenueRecord {
        name: env_or("LEAGUESYNC_VENUE_NAME", "Royal Palms Brooklyn"),
        slug: env_or("LEAGUESYNC_VENUE_SLUG", "royal-palms-brooklyn"),
        city: env_or("LEAGUESYNC_VENUE_CITY", "Brooklyn"),
        state: env_or("LEAGUESYNC_VENUE_STATE", "NY"),
        timezone: env_or("LEAGUESYNC_VENUE_TIMEZONE", "America/New_York"),
        website_url: env_or(
            "LEAGUESYNC_VENUE_URL",
            "https://www.royalpalmsbrooklyn.com/",
        ),
    }
}

/// An override that is set but unparsable aborts the run instead of being
/// silently replaced by the default.
fn parse_batch_size(raw: Option<String>) -> Result<usize> {
    let size = match raw {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("bad LEAGUESYNC_BATCH_SIZE {raw:?}"))?,
        None => DEFAULT_MATCH_BATCH_SIZE,
    };
    Ok(size.max(1))
}

fn env_nonempty(key: &str) -> Option<String> {
    let raw = std::env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

fn env_or(key: &str, default: &str) -> String {
    env_nonempty(key).unwrap_or_else(|| default.to_string())
}

fn default_db_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(CACHE_DIR).join(DB_FILE));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR).join(DB_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_override_must_parse() {
        assert_eq!(parse_batch_size(None).unwrap(), DEFAULT_MATCH_BATCH_SIZE);
        assert_eq!(parse_batch_size(Some("250".to_string())).unwrap(), 250);
        // Zero is clamped rather than producing empty chunks.
        assert_eq!(parse_batch_size(Some("0".to_string())).unwrap(), 1);
        assert!(parse_batch_size(Some("lots".to_string())).is_err());
    }
}
