use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::canonical::{DayOfWeek, DivisionLevel};
use crate::store::{
    DivisionRecord, DivisionRow, InternalId, MatchPage, MatchPageToken, MatchRecord, MatchRow,
    MatchStatus, SCAN_PAGE_SIZE, SeasonRecord, SeasonRow, Store, StoredWinner, TeamRecord, TeamRow,
    VenueRecord, VenueRow, WinnerBasis,
};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open sqlite db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS venues (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            city TEXT NOT NULL,
            state TEXT NOT NULL,
            timezone TEXT NOT NULL,
            website_url TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            venue_id INTEGER NOT NULL REFERENCES venues(id),
            external_id TEXT NOT NULL,
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            rating INTEGER NULL,
            all_time_wins INTEGER NOT NULL,
            all_time_losses INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(venue_id, external_id),
            UNIQUE(venue_id, slug)
        );
        CREATE TABLE IF NOT EXISTS seasons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            venue_id INTEGER NOT NULL REFERENCES venues(id),
            external_id TEXT NOT NULL,
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            start_date TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(venue_id, slug)
        );
        CREATE TABLE IF NOT EXISTS divisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            season_id INTEGER NOT NULL REFERENCES seasons(id),
            external_id TEXT NOT NULL,
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            day_of_week TEXT NOT NULL,
            level TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(season_id, slug)
        );
        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            division_id INTEGER NOT NULL REFERENCES divisions(id),
            team_a_id INTEGER NOT NULL REFERENCES teams(id),
            team_b_id INTEGER NOT NULL REFERENCES teams(id),
            scheduled_date TEXT NOT NULL,
            scheduled_time TEXT NOT NULL,
            court TEXT NOT NULL,
            status TEXT NOT NULL,
            winner_id INTEGER NULL REFERENCES teams(id),
            winner_basis TEXT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_division_date
            ON matches(division_id, scheduled_date);
        CREATE INDEX IF NOT EXISTS idx_matches_winner ON matches(winner_id);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn date_to_sql(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

fn date_from_sql(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FMT).with_context(|| format!("bad stored date {raw:?}"))
}

fn time_from_sql(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, TIME_FMT).with_context(|| format!("bad stored time {raw:?}"))
}

// Raw row shapes: decode text columns inside the rusqlite closure, convert to
// typed records afterwards so parse failures surface as anyhow errors instead
// of being shoehorned into rusqlite::Error.
struct RawSeasonRow {
    id: InternalId,
    venue_id: InternalId,
    external_id: String,
    name: String,
    slug: String,
    start_date: String,
}

struct RawDivisionRow {
    id: InternalId,
    season_id: InternalId,
    external_id: String,
    name: String,
    slug: String,
    day_of_week: String,
    level: String,
}

struct RawMatchRow {
    id: InternalId,
    division_id: InternalId,
    team_a_id: InternalId,
    team_b_id: InternalId,
    scheduled_date: String,
    scheduled_time: String,
    court: String,
    status: String,
    winner_id: Option<InternalId>,
    winner_basis: Option<String>,
}

fn read_raw_match(row: &Row<'_>) -> rusqlite::Result<RawMatchRow> {
    Ok(RawMatchRow {
        id: row.get(0)?,
        division_id: row.get(1)?,
        team_a_id: row.get(2)?,
        team_b_id: row.get(3)?,
        scheduled_date: row.get(4)?,
        scheduled_time: row.get(5)?,
        court: row.get(6)?,
        status: row.get(7)?,
        winner_id: row.get(8)?,
        winner_basis: row.get(9)?,
    })
}

fn match_row_from_raw(raw: RawMatchRow) -> Result<MatchRow> {
    let winner = match (raw.winner_id, raw.winner_basis.as_deref()) {
        (Some(team_id), Some(basis)) => Some(StoredWinner {
            team_id,
            basis: WinnerBasis::from_str_exact(basis)?,
        }),
        (Some(team_id), None) => Some(StoredWinner {
            team_id,
            basis: WinnerBasis::Single,
        }),
        _ => None,
    };
    Ok(MatchRow {
        id: raw.id,
        record: MatchRecord {
            division_id: raw.division_id,
            team_a_id: raw.team_a_id,
            team_b_id: raw.team_b_id,
            scheduled_date: date_from_sql(&raw.scheduled_date)?,
            scheduled_time: time_from_sql(&raw.scheduled_time)?,
            court: raw.court,
            status: MatchStatus::from_str_exact(&raw.status)?,
        },
        winner,
    })
}

const MATCH_COLUMNS: &str = "id, division_id, team_a_id, team_b_id, scheduled_date, \
     scheduled_time, court, status, winner_id, winner_basis";

impl Store for SqliteStore {
    fn find_venue_by_slug(&mut self, slug: &str) -> Result<Option<VenueRow>> {
        self.conn
            .query_row(
                "SELECT id, name, slug, city, state, timezone, website_url
                 FROM venues WHERE slug = ?1",
                params![slug],
                |row| {
                    Ok(VenueRow {
                        id: row.get(0)?,
                        record: VenueRecord {
                            name: row.get(1)?,
                            slug: row.get(2)?,
                            city: row.get(3)?,
                            state: row.get(4)?,
                            timezone: row.get(5)?,
                            website_url: row.get(6)?,
                        },
                    })
                },
            )
            .optional()
            .context("find venue by slug")
    }

    fn insert_venue(&mut self, record: &VenueRecord) -> Result<InternalId> {
        self.conn
            .execute(
                "INSERT INTO venues(name, slug, city, state, timezone, website_url, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.name,
                    record.slug,
                    record.city,
                    record.state,
                    record.timezone,
                    record.website_url,
                    now()
                ],
            )
            .context("insert venue")?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_venue(&mut self, id: InternalId, record: &VenueRecord) -> Result<()> {
        self.conn
            .execute(
                "UPDATE venues
                 SET name = ?1, city = ?2, state = ?3, timezone = ?4,
                     website_url = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![
                    record.name,
                    record.city,
                    record.state,
                    record.timezone,
                    record.website_url,
                    now(),
                    id
                ],
            )
            .context("update venue")?;
        Ok(())
    }

    fn find_team_by_external_id(
        &mut self,
        venue_id: InternalId,
        external_id: &str,
    ) -> Result<Option<TeamRow>> {
        self.find_team(
            "SELECT id, venue_id, external_id, name, slug, rating, all_time_wins, all_time_losses
             FROM teams WHERE venue_id = ?1 AND external_id = ?2",
            venue_id,
            external_id,
        )
        .context("find team by external id")
    }

    fn find_team_by_slug(&mut self, venue_id: InternalId, slug: &str) -> Result<Option<TeamRow>> {
        self.find_team(
            "SELECT id, venue_id, external_id, name, slug, rating, all_time_wins, all_time_losses
             FROM teams WHERE venue_id = ?1 AND slug = ?2",
            venue_id,
            slug,
        )
        .context("find team by slug")
    }

    fn insert_team(&mut self, venue_id: InternalId, record: &TeamRecord) -> Result<InternalId> {
        self.conn
            .execute(
                "INSERT INTO teams(venue_id, external_id, name, slug, rating,
                                   all_time_wins, all_time_losses, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    venue_id,
                    record.external_id,
                    record.name,
                    record.slug,
                    record.rating,
                    record.all_time_wins,
                    record.all_time_losses,
                    now()
                ],
            )
            .context("insert team")?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_team(&mut self, id: InternalId, record: &TeamRecord) -> Result<()> {
        self.conn
            .execute(
                "UPDATE teams
                 SET name = ?1, slug = ?2, rating = ?3, all_time_wins = ?4,
                     all_time_losses = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![
                    record.name,
                    record.slug,
                    record.rating,
                    record.all_time_wins,
                    record.all_time_losses,
                    now(),
                    id
                ],
            )
            .context("update team")?;
        Ok(())
    }

    fn find_season_by_slug(
        &mut self,
        venue_id: InternalId,
        slug: &str,
    ) -> Result<Option<SeasonRow>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, venue_id, external_id, name, slug, start_date
                 FROM seasons WHERE venue_id = ?1 AND slug = ?2",
                params![venue_id, slug],
                |row| {
                    Ok(RawSeasonRow {
                        id: row.get(0)?,
                        venue_id: row.get(1)?,
                        external_id: row.get(2)?,
                        name: row.get(3)?,
                        slug: row.get(4)?,
                        start_date: row.get(5)?,
                    })
                },
            )
            .optional()
            .context("find season by slug")?;
        raw.map(|raw| {
            Ok(SeasonRow {
                id: raw.id,
                venue_id: raw.venue_id,
                record: SeasonRecord {
                    external_id: raw.external_id,
                    name: raw.name,
                    slug: raw.slug,
                    start_date: date_from_sql(&raw.start_date)?,
                },
            })
        })
        .transpose()
    }

    fn insert_season(
        &mut self,
        venue_id: InternalId,
        record: &SeasonRecord,
    ) -> Result<InternalId> {
        self.conn
            .execute(
                "INSERT INTO seasons(venue_id, external_id, name, slug, start_date, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    venue_id,
                    record.external_id,
                    record.name,
                    record.slug,
                    date_to_sql(record.start_date),
                    now()
                ],
            )
            .context("insert season")?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_season(&mut self, id: InternalId, record: &SeasonRecord) -> Result<()> {
        self.conn
            .execute(
                "UPDATE seasons
                 SET name = ?1, start_date = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![record.name, date_to_sql(record.start_date), now(), id],
            )
            .context("update season")?;
        Ok(())
    }

    fn find_division_by_slug(
        &mut self,
        season_id: InternalId,
        slug: &str,
    ) -> Result<Option<DivisionRow>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, season_id, external_id, name, slug, day_of_week, level
                 FROM divisions WHERE season_id = ?1 AND slug = ?2",
                params![season_id, slug],
                |row| {
                    Ok(RawDivisionRow {
                        id: row.get(0)?,
                        season_id: row.get(1)?,
                        external_id: row.get(2)?,
                        name: row.get(3)?,
                        slug: row.get(4)?,
                        day_of_week: row.get(5)?,
                        level: row.get(6)?,
                    })
                },
            )
            .optional()
            .context("find division by slug")?;
        raw.map(|raw| {
            let day_of_week = DayOfWeek::from_str_exact(&raw.day_of_week)
                .with_context(|| format!("bad stored day_of_week {:?}", raw.day_of_week))?;
            let level = DivisionLevel::from_str_exact(&raw.level)
                .with_context(|| format!("bad stored level {:?}", raw.level))?;
            Ok(DivisionRow {
                id: raw.id,
                season_id: raw.season_id,
                record: DivisionRecord {
                    external_id: raw.external_id,
                    name: raw.name,
                    slug: raw.slug,
                    day_of_week,
                    level,
                },
            })
        })
        .transpose()
    }

    fn insert_division(
        &mut self,
        season_id: InternalId,
        record: &DivisionRecord,
    ) -> Result<InternalId> {
        self.conn
            .execute(
                "INSERT INTO divisions(season_id, external_id, name, slug,
                                       day_of_week, level, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    season_id,
                    record.external_id,
                    record.name,
                    record.slug,
                    record.day_of_week.as_str(),
                    record.level.as_str(),
                    now()
                ],
            )
            .context("insert division")?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_division(&mut self, id: InternalId, record: &DivisionRecord) -> Result<()> {
        self.conn
            .execute(
                "UPDATE divisions
                 SET name = ?1, day_of_week = ?2, level = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    record.name,
                    record.day_of_week.as_str(),
                    record.level.as_str(),
                    now(),
                    id
                ],
            )
            .context("update division")?;
        Ok(())
    }

    fn find_match(
        &mut self,
        division_id: InternalId,
        date: NaiveDate,
        team_a_id: InternalId,
        team_b_id: InternalId,
    ) -> Result<Option<MatchRow>> {
        let sql = format!(
            "SELECT {MATCH_COLUMNS} FROM matches
             WHERE division_id = ?1 AND scheduled_date = ?2
               AND ((team_a_id = ?3 AND team_b_id = ?4)
                 OR (team_a_id = ?4 AND team_b_id = ?3))"
        );
        let raw = self
            .conn
            .query_row(
                &sql,
                params![division_id, date_to_sql(date), team_a_id, team_b_id],
                read_raw_match,
            )
            .optional()
            .context("find match by natural key")?;
        raw.map(match_row_from_raw).transpose()
    }

    fn insert_matches(&mut self, records: &[MatchRecord]) -> Result<Vec<InternalId>> {
        let tx = self.conn.transaction().context("begin match batch")?;
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            tx.execute(
                "INSERT INTO matches(division_id, team_a_id, team_b_id, scheduled_date,
                                     scheduled_time, court, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.division_id,
                    record.team_a_id,
                    record.team_b_id,
                    date_to_sql(record.scheduled_date),
                    record.scheduled_time.format(TIME_FMT).to_string(),
                    record.court,
                    record.status.as_str(),
                    now()
                ],
            )
            .context("insert match")?;
            ids.push(tx.last_insert_rowid());
        }
        tx.commit().context("commit match batch")?;
        Ok(ids)
    }

    fn update_match(&mut self, id: InternalId, record: &MatchRecord) -> Result<()> {
        // winner_id/winner_basis stay untouched; winner writes go through
        // set_match_winner and its precedence checks only.
        self.conn
            .execute(
                "UPDATE matches
                 SET scheduled_time = ?1, court = ?2, status = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    record.scheduled_time.format(TIME_FMT).to_string(),
                    record.court,
                    record.status.as_str(),
                    now(),
                    id
                ],
            )
            .context("update match")?;
        Ok(())
    }

    fn set_match_winner(&mut self, id: InternalId, winner: StoredWinner) -> Result<()> {
        self.conn
            .execute(
                "UPDATE matches
                 SET winner_id = ?1, winner_basis = ?2, status = 'completed', updated_at = ?3
                 WHERE id = ?4",
                params![winner.team_id, winner.basis.as_str(), now(), id],
            )
            .context("set match winner")?;
        Ok(())
    }

    fn scan_matches(&mut self, token: Option<MatchPageToken>) -> Result<MatchPage> {
        let offset = token.map(|t| t.0).unwrap_or(0);
        let sql = format!(
            "SELECT {MATCH_COLUMNS} FROM matches ORDER BY id ASC LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = self.conn.prepare(&sql).context("prepare match scan")?;
        let raw_rows = stmt
            .query_map(params![SCAN_PAGE_SIZE as i64, offset as i64], read_raw_match)
            .context("scan matches")?;

        let mut rows = Vec::new();
        for raw in raw_rows {
            rows.push(match_row_from_raw(raw.context("decode match row")?)?);
        }
        let next =
            (rows.len() == SCAN_PAGE_SIZE).then_some(MatchPageToken(offset + rows.len() as u64));
        Ok(MatchPage { rows, next })
    }
}

impl SqliteStore {
    fn find_team(
        &mut self,
        sql: &str,
        venue_id: InternalId,
        key: &str,
    ) -> Result<Option<TeamRow>> {
        self.conn
            .query_row(sql, params![venue_id, key], |row| {
                Ok(TeamRow {
                    id: row.get(0)?,
                    venue_id: row.get(1)?,
                    record: TeamRecord {
                        external_id: row.get(2)?,
                        name: row.get(3)?,
                        slug: row.get(4)?,
                        rating: row.get(5)?,
                        all_time_wins: row.get(6)?,
                        all_time_losses: row.get(7)?,
                    },
                })
            })
            .optional()
            .map_err(anyhow::Error::from)
    }
}
