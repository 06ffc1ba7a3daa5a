use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;

use leaguesync::document::{LeagueDocument, parse_document_json};
use leaguesync::sqlite_store::SqliteStore;
use leaguesync::store::{MatchRow, Store, VenueRecord, WinnerBasis};
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

fn all_matches(store: &mut SqliteStore) -> Vec<MatchRow> {
    let mut rows = Vec::new();
    let mut token = None;
    loop {
        let page = store.scan_matches(token).unwrap();
        rows.extend(page.rows);
        match page.next {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    rows
}

#[test]
fn sqlite_sync_is_idempotent() {
    let doc = fixture_document();
    let mut store = SqliteStore::open_in_memory().unwrap();

    let first = run_sync(&mut store, &doc, &options()).unwrap();
    assert_eq!(first.inserted, 10);
    let rows_after_first = all_matches(&mut store);

    let second = run_sync(&mut store, &doc, &options()).unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(all_matches(&mut store), rows_after_first);
}

#[test]
fn sqlite_team_upsert_reuses_the_internal_id() {
    let doc = fixture_document();
    let mut store = SqliteStore::open_in_memory().unwrap();

    run_sync(&mut store, &doc, &options()).unwrap();
    let venue = store
        .find_venue_by_slug("royal-palms-brooklyn")
        .unwrap()
        .expect("venue synced");
    let before = store
        .find_team_by_external_id(venue.id, "t100")
        .unwrap()
        .expect("team synced");

    run_sync(&mut store, &doc, &options()).unwrap();
    let after = store
        .find_team_by_external_id(venue.id, "t100")
        .unwrap()
        .expect("team still there");

    assert_eq!(before.id, after.id);
    assert_eq!(before.record, after.record);
}

#[test]
fn sqlite_winner_round_trips_through_scan() {
    let doc = fixture_document();
    let mut store = SqliteStore::open_in_memory().unwrap();
    run_sync(&mut store, &doc, &options()).unwrap();

    let date = NaiveDate::from_ymd_opt(2023, 10, 3).unwrap();
    let decided: Vec<MatchRow> = all_matches(&mut store)
        .into_iter()
        .filter(|m| m.record.scheduled_date == date)
        .collect();
    assert_eq!(decided.len(), 1);
    let winner = decided[0].winner.expect("confirmed winner stored");
    assert_eq!(winner.basis, WinnerBasis::Confirmed);

    let venue = store
        .find_venue_by_slug("royal-palms-brooklyn")
        .unwrap()
        .unwrap();
    let t100 = store
        .find_team_by_external_id(venue.id, "t100")
        .unwrap()
        .unwrap();
    assert_eq!(winner.team_id, t100.id);
}
