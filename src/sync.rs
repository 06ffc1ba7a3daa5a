use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info, warn};

use crate::canonical::{parse_date, parse_division_attributes, parse_time, slugify};
use crate::document::{LeagueDocument, RawMatch, RawTeamDetail};
use crate::resolver::{MatchKey, Verdict, observations_from_raw, resolve_winners};
use crate::store::{
    DivisionRecord, InternalId, MatchRecord, MatchRow, MatchStatus, SeasonRecord, Store,
    StoredWinner, TeamRecord, VenueRecord, WinnerBasis,
};

/// Kickoff time recorded when the source row has none.
pub const FALLBACK_MATCH_TIME: (u32, u32) = (19, 0);

/// How many external-id characters a disambiguated slug borrows.
const SLUG_SUFFIX_LEN: usize = 6;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub venue: VenueRecord,
    /// Season start recorded when the scraped start date is unparsable.
    pub fallback_season_start: NaiveDate,
    pub match_batch_size: usize,
}

/// Aggregate outcome of one full run. Mirrors what the run logged, so a
/// caller can print one block and know whether a re-run is worth it.
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped_invalid: usize,
    pub skipped_missing_parent: usize,
    pub skipped_error: usize,
    pub unresolved_winners: usize,
    pub winners_attached: usize,
    pub errors: Vec<String>,
}

/// External-to-internal id maps for one run. Explicit state threaded through
/// the phases, so repeated or concurrent runs in a test harness never share
/// leftovers.
#[derive(Debug, Default)]
struct SyncContext {
    venue_id: InternalId,
    team_ids: HashMap<String, InternalId>,
    season_ids: HashMap<String, InternalId>,
    division_ids: HashMap<String, InternalId>,
}

/// Project one scraped document into the store. Dependency order is strict:
/// venue, teams, seasons, divisions, matches, winners; a child is never
/// written before its parent has an internal id. Safe to run any number of
/// times over the same document.
pub fn run_sync(
    store: &mut dyn Store,
    doc: &LeagueDocument,
    opts: &SyncOptions,
) -> Result<SyncSummary> {
    let mut summary = SyncSummary::default();
    let mut ctx = SyncContext::default();

    sync_venue(store, opts, &mut ctx, &mut summary)?;
    sync_teams(store, doc, &mut ctx, &mut summary);
    sync_seasons_and_divisions(store, doc, opts, &mut ctx, &mut summary);
    sync_matches(store, doc, opts, &ctx, &mut summary);
    attach_winners(store, doc, &ctx, &mut summary);

    info!(
        inserted = summary.inserted,
        updated = summary.updated,
        skipped_invalid = summary.skipped_invalid,
        skipped_missing_parent = summary.skipped_missing_parent,
        skipped_error = summary.skipped_error,
        unresolved_winners = summary.unresolved_winners,
        winners_attached = summary.winners_attached,
        "sync complete"
    );
    Ok(summary)
}

/// The venue is the root parent and the first store call of the run; failing
/// here means the store is unusable, so it aborts instead of skipping.
fn sync_venue(
    store: &mut dyn Store,
    opts: &SyncOptions,
    ctx: &mut SyncContext,
    summary: &mut SyncSummary,
) -> Result<()> {
    let existing = store
        .find_venue_by_slug(&opts.venue.slug)
        .context("venue lookup failed")?;
    ctx.venue_id = match existing {
        Some(row) => {
            if row.record != opts.venue {
                store.update_venue(row.id, &opts.venue).context("venue refresh failed")?;
                summary.updated += 1;
            }
            row.id
        }
        None => {
            let id = store.insert_venue(&opts.venue).context("venue insert failed")?;
            summary.inserted += 1;
            info!(venue = %opts.venue.slug, id, "created venue");
            id
        }
    };
    Ok(())
}

fn sync_teams(
    store: &mut dyn Store,
    doc: &LeagueDocument,
    ctx: &mut SyncContext,
    summary: &mut SyncSummary,
) {
    for (external_id, detail) in &doc.all_teams {
        if detail.name.trim().is_empty() || detail.name == "Unknown" {
            debug!(external_id, "skipping team with no usable name");
            summary.skipped_invalid += 1;
            continue;
        }

        match upsert_team(store, ctx.venue_id, external_id, detail, summary) {
            Ok(id) => {
                ctx.team_ids.insert(external_id.clone(), id);
            }
            Err(err) => {
                warn!(external_id, error = %err, "team sync failed, skipping");
                summary.skipped_error += 1;
                summary.errors.push(format!("team {external_id}: {err}"));
            }
        }
    }
    info!(teams = ctx.team_ids.len(), "teams synced");
}

fn upsert_team(
    store: &mut dyn Store,
    venue_id: InternalId,
    external_id: &str,
    detail: &RawTeamDetail,
    summary: &mut SyncSummary,
) -> Result<InternalId> {
    let mut record = TeamRecord {
        external_id: external_id.to_string(),
        name: detail.name.clone(),
        slug: team_slug(&detail.name, external_id),
        rating: detail.rating,
        all_time_wins: detail.all_time_wins,
        all_time_losses: detail.all_time_losses,
    };

    if let Some(existing) = store.find_team_by_external_id(venue_id, external_id)? {
        // Slugs are assigned once; a renamed team keeps its slug so links to
        // it stay valid and no collision churn happens on re-runs.
        record.slug = existing.record.slug.clone();
        if existing.record != record {
            store.update_team(existing.id, &record)?;
            summary.updated += 1;
        }
        return Ok(existing.id);
    }

    if let Some(holder) = store.find_team_by_slug(venue_id, &record.slug)? {
        if holder.record.external_id != *external_id {
            record.slug = disambiguated_slug(&record.slug, external_id);
        }
    }
    let id = store.insert_team(venue_id, &record)?;
    summary.inserted += 1;
    Ok(id)
}

fn team_slug(name: &str, external_id: &str) -> String {
    let slug = slugify(name);
    if slug.is_empty() {
        format!("team-{external_id}")
    } else {
        slug
    }
}

fn disambiguated_slug(slug: &str, external_id: &str) -> String {
    let suffix: String = external_id.chars().take(SLUG_SUFFIX_LEN).collect();
    format!("{slug}-{suffix}")
}

fn sync_seasons_and_divisions(
    store: &mut dyn Store,
    doc: &LeagueDocument,
    opts: &SyncOptions,
    ctx: &mut SyncContext,
    summary: &mut SyncSummary,
) {
    for season in &doc.seasons {
        let start_date = match parse_date(&season.start_date) {
            Some(date) => date,
            None => {
                warn!(
                    season = %season.name,
                    raw = %season.start_date,
                    fallback = %opts.fallback_season_start,
                    "unparsable season start date, recording fallback"
                );
                opts.fallback_season_start
            }
        };
        let record = SeasonRecord {
            external_id: season.id.clone(),
            name: season.name.clone(),
            slug: slugify(&season.name),
            start_date,
        };

        let season_id = match upsert_season(store, ctx.venue_id, &record, summary) {
            Ok(id) => {
                ctx.season_ids.insert(season.id.clone(), id);
                id
            }
            Err(err) => {
                warn!(season = %season.name, error = %err, "season sync failed, skipping subtree");
                summary.skipped_error += 1;
                summary.errors.push(format!("season {}: {err}", season.id));
                // Children of an unsynced season have no parent id.
                summary.skipped_missing_parent += season.divisions.len();
                for division in &season.divisions {
                    summary.skipped_missing_parent += division.matches.len();
                }
                continue;
            }
        };

        for division in &season.divisions {
            let (day_of_week, level) = parse_division_attributes(&division.name);
            let record = DivisionRecord {
                external_id: division.id.clone(),
                name: division.name.clone(),
                slug: slugify(&division.name),
                day_of_week,
                level,
            };
            match upsert_division(store, season_id, &record, summary) {
                Ok(id) => {
                    ctx.division_ids.insert(division.id.clone(), id);
                }
                Err(err) => {
                    warn!(division = %division.name, error = %err, "division sync failed, skipping");
                    summary.skipped_error += 1;
                    summary.errors.push(format!("division {}: {err}", division.id));
                    summary.skipped_missing_parent += division.matches.len();
                }
            }
        }
    }
    info!(
        seasons = ctx.season_ids.len(),
        divisions = ctx.division_ids.len(),
        "seasons and divisions synced"
    );
}

fn upsert_season(
    store: &mut dyn Store,
    venue_id: InternalId,
    record: &SeasonRecord,
    summary: &mut SyncSummary,
) -> Result<InternalId> {
    if let Some(existing) = store.find_season_by_slug(venue_id, &record.slug)? {
        if existing.record != *record {
            store.update_season(existing.id, record)?;
            summary.updated += 1;
        }
        return Ok(existing.id);
    }
    let id = store.insert_season(venue_id, record)?;
    summary.inserted += 1;
    Ok(id)
}

fn upsert_division(
    store: &mut dyn Store,
    season_id: InternalId,
    record: &DivisionRecord,
    summary: &mut SyncSummary,
) -> Result<InternalId> {
    if let Some(existing) = store.find_division_by_slug(season_id, &record.slug)? {
        if existing.record != *record {
            store.update_division(existing.id, record)?;
            summary.updated += 1;
        }
        return Ok(existing.id);
    }
    let id = store.insert_division(season_id, record)?;
    summary.inserted += 1;
    Ok(id)
}

fn sync_matches(
    store: &mut dyn Store,
    doc: &LeagueDocument,
    opts: &SyncOptions,
    ctx: &SyncContext,
    summary: &mut SyncSummary,
) {
    let fallback_time =
        NaiveTime::from_hms_opt(FALLBACK_MATCH_TIME.0, FALLBACK_MATCH_TIME.1, 0)
            .expect("fallback time is valid");

    for season in &doc.seasons {
        if !ctx.season_ids.contains_key(&season.id) {
            continue; // already counted when the season failed
        }
        let season_start = parse_date(&season.start_date).unwrap_or(opts.fallback_season_start);

        for division in &season.divisions {
            let Some(&division_id) = ctx.division_ids.get(&division.id) else {
                continue;
            };

            let mut pending: Vec<MatchRecord> = Vec::new();
            for raw in &division.matches {
                match prepare_match(store, raw, division_id, season_start, fallback_time, ctx) {
                    Ok(Prepared::Update(id, record)) => match store.update_match(id, &record) {
                        Ok(()) => summary.updated += 1,
                        Err(err) => {
                            warn!(match_id = id, error = %err, "match update failed, skipping");
                            summary.skipped_error += 1;
                            summary.errors.push(format!("match {id}: {err}"));
                        }
                    },
                    Ok(Prepared::Insert(record)) => pending.push(record),
                    Ok(Prepared::Unchanged) => {}
                    Ok(Prepared::MissingParent) => summary.skipped_missing_parent += 1,
                    Err(err) => {
                        warn!(division = %division.name, error = %err, "match lookup failed, skipping");
                        summary.skipped_error += 1;
                        summary.errors.push(format!("division {}: {err}", division.id));
                    }
                }
            }

            // Bounded batches; one failed batch is recorded and the rest of
            // the run carries on.
            for batch in pending.chunks(opts.match_batch_size.max(1)) {
                match store.insert_matches(batch) {
                    Ok(ids) => summary.inserted += ids.len(),
                    Err(err) => {
                        warn!(
                            division = %division.name,
                            batch_len = batch.len(),
                            error = %err,
                            "match batch insert failed, continuing"
                        );
                        summary.skipped_error += batch.len();
                        summary.errors.push(format!(
                            "match batch ({} rows) in division {}: {err}",
                            batch.len(),
                            division.id
                        ));
                    }
                }
            }
        }
    }
}

enum Prepared {
    Insert(MatchRecord),
    Update(InternalId, MatchRecord),
    Unchanged,
    MissingParent,
}

fn prepare_match(
    store: &mut dyn Store,
    raw: &RawMatch,
    division_id: InternalId,
    season_start: NaiveDate,
    fallback_time: NaiveTime,
    ctx: &SyncContext,
) -> Result<Prepared> {
    let (Some(&team_a_id), Some(&team_b_id)) = (
        ctx.team_ids.get(&raw.team_a_id),
        ctx.team_ids.get(&raw.team_b_id),
    ) else {
        return Ok(Prepared::MissingParent);
    };

    let scheduled_date = parse_date(&raw.date).unwrap_or(season_start);
    let scheduled_time = parse_time(&raw.time).unwrap_or(fallback_time);
    let status = if raw.status == "completed" {
        MatchStatus::Completed
    } else {
        MatchStatus::Scheduled
    };

    let mut record = MatchRecord {
        division_id,
        team_a_id,
        team_b_id,
        scheduled_date,
        scheduled_time,
        court: raw.court.clone(),
        status,
    };

    match store.find_match(division_id, scheduled_date, team_a_id, team_b_id)? {
        Some(existing) => {
            // A stored winner means the contest is decided; a schedule-page
            // refresh never walks that back to "scheduled".
            if existing.winner.is_some() {
                record.status = MatchStatus::Completed;
            }
            if existing.record == record {
                Ok(Prepared::Unchanged)
            } else {
                Ok(Prepared::Update(existing.id, record))
            }
        }
        None => Ok(Prepared::Insert(record)),
    }
}

fn attach_winners(
    store: &mut dyn Store,
    doc: &LeagueDocument,
    ctx: &SyncContext,
    summary: &mut SyncSummary,
) {
    let observations = observations_from_raw(&doc.team_match_results);
    let verdicts = resolve_winners(&observations);
    summary.unresolved_winners = verdicts
        .values()
        .filter(|v| matches!(v, Verdict::Unresolved))
        .count();
    if summary.unresolved_winners > 0 {
        warn!(
            count = summary.unresolved_winners,
            "matches with contradictory reports left unresolved"
        );
    }

    let internal_to_external: HashMap<InternalId, &str> = ctx
        .team_ids
        .iter()
        .map(|(external, internal)| (*internal, external.as_str()))
        .collect();

    let mut token = None;
    loop {
        let page = match store.scan_matches(token) {
            Ok(page) => page,
            Err(err) => {
                warn!(error = %err, "match scan failed, aborting winner attachment");
                summary.errors.push(format!("match scan: {err}"));
                summary.skipped_error += 1;
                return;
            }
        };
        for row in &page.rows {
            apply_verdict(store, row, &verdicts, &internal_to_external, ctx, summary);
        }
        match page.next {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    info!(winners_attached = summary.winners_attached, "winner attachment complete");
}

fn apply_verdict(
    store: &mut dyn Store,
    row: &MatchRow,
    verdicts: &std::collections::BTreeMap<MatchKey, Verdict>,
    internal_to_external: &HashMap<InternalId, &str>,
    ctx: &SyncContext,
    summary: &mut SyncSummary,
) {
    let (Some(ext_a), Some(ext_b)) = (
        internal_to_external.get(&row.record.team_a_id),
        internal_to_external.get(&row.record.team_b_id),
    ) else {
        return; // teams from an earlier deployment, not in this document
    };

    let key = MatchKey::new(row.record.scheduled_date, ext_a, ext_b);
    let Some(Verdict::Winner { team_id, confirmed }) = verdicts.get(&key) else {
        // Unresolved and NoData never touch a stored winner.
        return;
    };

    let Some(&winner_internal) = ctx.team_ids.get(team_id) else {
        return;
    };
    if winner_internal != row.record.team_a_id && winner_internal != row.record.team_b_id {
        // Winner must be one of the match's own teams.
        warn!(match_id = row.id, winner = %team_id, "verdict winner not in match pair, ignoring");
        return;
    }

    let basis = if *confirmed {
        WinnerBasis::Confirmed
    } else {
        WinnerBasis::Single
    };
    let overwrite = match row.winner {
        None => true,
        // Upgrade a single-sided verdict once both sides agree; a confirmed
        // winner is final.
        Some(stored) => stored.basis == WinnerBasis::Single && basis == WinnerBasis::Confirmed,
    };
    if !overwrite {
        return;
    }

    match store.set_match_winner(
        row.id,
        StoredWinner {
            team_id: winner_internal,
            basis,
        },
    ) {
        Ok(()) => summary.winners_attached += 1,
        Err(err) => {
            warn!(match_id = row.id, error = %err, "winner update failed, skipping");
            summary.skipped_error += 1;
            summary.errors.push(format!("winner for match {}: {err}", row.id));
        }
    }
}
