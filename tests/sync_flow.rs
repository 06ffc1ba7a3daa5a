use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};

use leaguesync::document::{LeagueDocument, RawTeamResult, parse_document_json};
use leaguesync::store::{
    DivisionRow, MatchRow, MatchStatus, MemoryStore, SeasonRow, TeamRow, VenueRecord, VenueRow,
    WinnerBasis,
};
use leaguesync::sync::{SyncOptions, run_sync};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn fixture_document() -> LeagueDocument {
    parse_document_json(&read_fixture("league_document.json")).expect("fixture should parse")
}

fn options() -> SyncOptions {
    SyncOptions {
        venue: VenueRecord {
            name: "Royal Palms Brooklyn".to_string(),
            slug: "royal-palms-brooklyn".to_string(),
            city: "Brooklyn".to_string(),
            state: "NY".to_string(),
            timezone: "America/New_York".to_string(),
            website_url: "https://www.royalpalmsbrooklyn.com/".to_string(),
        },
        fallback_season_start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        match_batch_size: 100,
    }
}

type Snapshot = (
    Vec<VenueRow>,
    Vec<TeamRow>,
    Vec<SeasonRow>,
    Vec<DivisionRow>,
    Vec<MatchRow>,
);

fn snapshot(store: &MemoryStore) -> Snapshot {
    (
        store.venues.clone(),
        store.teams.clone(),
        store.seasons.clone(),
        store.divisions.clone(),
        store.matches.clone(),
    )
}

fn team_id(store: &MemoryStore, external_id: &str) -> i64 {
    store
        .teams
        .iter()
        .find(|t| t.record.external_id == external_id)
        .map(|t| t.id)
        .expect("team should exist")
}

#[test]
fn full_sync_projects_the_document() {
    let doc = fixture_document();
    let mut store = MemoryStore::new();
    let summary = run_sync(&mut store, &doc, &options()).unwrap();

    assert_eq!(store.venues.len(), 1);
    assert_eq!(store.teams.len(), 3);
    assert_eq!(store.seasons.len(), 1);
    assert_eq!(store.divisions.len(), 2);
    assert_eq!(store.matches.len(), 3);

    // venue + 3 teams + season + 2 divisions + 3 matches
    assert_eq!(summary.inserted, 10);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.skipped_invalid, 1); // the "Unknown" team
    assert_eq!(summary.skipped_missing_parent, 1); // match against unmapped t999
    assert_eq!(summary.skipped_error, 0);
    assert_eq!(summary.winners_attached, 2);
    assert_eq!(summary.unresolved_winners, 1);

    let season = &store.seasons[0];
    assert_eq!(season.record.slug, "fall-2023");
    assert_eq!(
        season.record.start_date,
        NaiveDate::from_ymd_opt(2023, 9, 12).unwrap()
    );

    let cherry = &store.divisions[0];
    assert_eq!(cherry.record.slug, "tuesday-night-cherry");
    assert_eq!(cherry.record.day_of_week.as_str(), "tuesday");
    assert_eq!(cherry.record.level.as_str(), "cherry");
}

#[test]
fn identical_team_names_get_distinct_slugs() {
    let doc = fixture_document();
    let mut store = MemoryStore::new();
    run_sync(&mut store, &doc, &options()).unwrap();

    let mut slugs: Vec<&str> = store.teams.iter().map(|t| t.record.slug.as_str()).collect();
    slugs.sort_unstable();
    assert_eq!(slugs, ["sweep-the-leg", "the-ice-holes", "the-ice-holes-t300"]);
}

#[test]
fn second_run_converges_to_identical_snapshot() {
    let doc = fixture_document();
    let mut store = MemoryStore::new();
    run_sync(&mut store, &doc, &options()).unwrap();
    let first = snapshot(&store);

    let summary = run_sync(&mut store, &doc, &options()).unwrap();
    assert_eq!(snapshot(&store), first);
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.winners_attached, 0);
    // The contradiction is re-detected on every run.
    assert_eq!(summary.unresolved_winners, 1);
}

#[test]
fn winner_attachment_respects_verdict_strength() {
    let doc = fixture_document();
    let mut store = MemoryStore::new();
    run_sync(&mut store, &doc, &options()).unwrap();

    let t100 = team_id(&store, "t100");
    let date = NaiveDate::from_ymd_opt(2023, 10, 3).unwrap();

    let confirmed = store
        .matches
        .iter()
        .find(|m| m.record.scheduled_date == date)
        .unwrap();
    let winner = confirmed.winner.expect("both sides agreed");
    assert_eq!(winner.team_id, t100);
    assert_eq!(winner.basis, WinnerBasis::Confirmed);
    assert_eq!(confirmed.record.status, MatchStatus::Completed);

    let single = store
        .matches
        .iter()
        .find(|m| m.record.scheduled_date == NaiveDate::from_ymd_opt(2023, 10, 10).unwrap())
        .unwrap();
    let winner = single.winner.expect("one side reported");
    assert_eq!(winner.team_id, t100);
    assert_eq!(winner.basis, WinnerBasis::Single);

    // Contradictory reports leave the match undecided.
    let contested = store
        .matches
        .iter()
        .find(|m| m.record.scheduled_date == NaiveDate::from_ymd_opt(2023, 10, 5).unwrap())
        .unwrap();
    assert!(contested.winner.is_none());
    assert_eq!(contested.record.status, MatchStatus::Scheduled);
}

#[test]
fn stored_winner_survives_later_unresolved_verdict() {
    let mut doc = fixture_document();
    let mut store = MemoryStore::new();
    run_sync(&mut store, &doc, &options()).unwrap();

    let t100 = team_id(&store, "t100");

    // The 10/3 match flips to a contradiction in the next scrape.
    for row in &mut doc.team_match_results {
        if row.date == "10/3/2023" {
            row.result = Some("won".to_string());
        }
    }
    let summary = run_sync(&mut store, &doc, &options()).unwrap();
    assert!(summary.unresolved_winners >= 1);

    let date = NaiveDate::from_ymd_opt(2023, 10, 3).unwrap();
    let row = store
        .matches
        .iter()
        .find(|m| m.record.scheduled_date == date)
        .unwrap();
    let winner = row.winner.expect("confirmed winner must survive");
    assert_eq!(winner.team_id, t100);
    assert_eq!(winner.basis, WinnerBasis::Confirmed);
}

#[test]
fn single_sided_winner_upgrades_once_both_sides_agree() {
    let mut doc = fixture_document();
    // First scrape: only the winner's page mentions the 10/3 match.
    doc.team_match_results = vec![RawTeamResult {
        team_id: "t100".to_string(),
        opponent_id: "t200".to_string(),
        date: "10/3/2023".to_string(),
        result: Some("won".to_string()),
    }];
    let mut store = MemoryStore::new();
    run_sync(&mut store, &doc, &options()).unwrap();

    let date = NaiveDate::from_ymd_opt(2023, 10, 3).unwrap();
    let basis = store
        .matches
        .iter()
        .find(|m| m.record.scheduled_date == date)
        .and_then(|m| m.winner)
        .map(|w| w.basis);
    assert_eq!(basis, Some(WinnerBasis::Single));

    // Next scrape: the loser's page confirms it.
    doc.team_match_results.push(RawTeamResult {
        team_id: "t200".to_string(),
        opponent_id: "t100".to_string(),
        date: "10/3/2023".to_string(),
        result: Some("lost".to_string()),
    });
    let summary = run_sync(&mut store, &doc, &options()).unwrap();
    assert_eq!(summary.winners_attached, 1);

    let winner = store
        .matches
        .iter()
        .find(|m| m.record.scheduled_date == date)
        .and_then(|m| m.winner)
        .unwrap();
    assert_eq!(winner.team_id, team_id(&store, "t100"));
    assert_eq!(winner.basis, WinnerBasis::Confirmed);
}

#[test]
fn failed_match_batch_is_skipped_and_recovered_by_rerun() {
    let doc = fixture_document();
    let mut store = MemoryStore::new();
    store.fail_next_batch_inserts = 1;

    let summary = run_sync(&mut store, &doc, &options()).unwrap();
    // The first division's batch of two matches failed; the next batch went
    // through.
    assert_eq!(summary.skipped_error, 2);
    assert_eq!(store.matches.len(), 1);
    assert!(!summary.errors.is_empty());

    // Re-running from the same input is the recovery mechanism.
    let summary = run_sync(&mut store, &doc, &options()).unwrap();
    assert_eq!(summary.skipped_error, 0);
    assert_eq!(store.matches.len(), 3);
}

#[test]
fn unparsable_dates_fall_back_without_losing_records() {
    let mut doc = fixture_document();
    doc.seasons[0].start_date = "whenever".to_string();
    doc.seasons[0].divisions[0].matches[0].date = "??".to_string();

    let mut store = MemoryStore::new();
    run_sync(&mut store, &doc, &options()).unwrap();

    let fallback = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    assert_eq!(store.seasons[0].record.start_date, fallback);
    // The dateless match lands on the season's (fallback) start date.
    assert!(
        store
            .matches
            .iter()
            .any(|m| m.record.scheduled_date == fallback)
    );
    // Empty time falls back to the default kickoff.
    assert!(
        store
            .matches
            .iter()
            .any(|m| m.record.scheduled_time == NaiveTime::from_hms_opt(19, 0, 0).unwrap())
    );
}
