use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Scraper output document. The fetch/extract step is a separate tool; this
/// crate consumes its JSON file as-is and normalizes from there.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LeagueDocument {
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub scraped_at: Option<String>,
    #[serde(default)]
    pub seasons: Vec<RawSeason>,
    /// Keyed by external team id. BTreeMap so a full run visits teams in a
    /// stable order regardless of how the scraper serialized them.
    #[serde(default)]
    pub all_teams: BTreeMap<String, RawTeamDetail>,
    #[serde(default)]
    pub team_match_results: Vec<RawTeamResult>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSeason {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub divisions: Vec<RawDivision>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawDivision {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub teams: Vec<RawStanding>,
    #[serde(default)]
    pub matches: Vec<RawMatch>,
}

/// Standings row; wins/losses here are per-division, the all-time record
/// lives on `RawTeamDetail`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawStanding {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawMatch {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub court: String,
    pub team_a_id: String,
    pub team_b_id: String,
    #[serde(default)]
    pub team_a_name: String,
    #[serde(default)]
    pub team_b_name: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTeamDetail {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "elo")]
    pub rating: Option<i64>,
    #[serde(default)]
    pub all_time_wins: u32,
    #[serde(default)]
    pub all_time_losses: u32,
}

/// One team-page row: a match as seen from one team's perspective. Each
/// physical match shows up at most twice across the document, once per side.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTeamResult {
    pub team_id: String,
    pub opponent_id: String,
    #[serde(default)]
    pub date: String,
    /// "won", "lost", "unknown" or absent.
    #[serde(default)]
    pub result: Option<String>,
}

pub fn load_document(path: &Path) -> Result<LeagueDocument> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read league document {}", path.display()))?;
    parse_document_json(&raw)
}

pub fn parse_document_json(raw: &str) -> Result<LeagueDocument> {
    serde_json::from_str(raw.trim()).context("invalid league document json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_parses_to_defaults() {
        let doc = parse_document_json("{}").unwrap();
        assert!(doc.seasons.is_empty());
        assert!(doc.all_teams.is_empty());
        assert!(doc.team_match_results.is_empty());
    }

    #[test]
    fn missing_result_is_none() {
        let doc = parse_document_json(
            r#"{"team_match_results":[
                {"team_id":"1","opponent_id":"2","date":"10/3/2023"},
                {"team_id":"2","opponent_id":"1","date":"10/3/2023","result":"won"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(doc.team_match_results[0].result, None);
        assert_eq!(doc.team_match_results[1].result.as_deref(), Some("won"));
    }
}
