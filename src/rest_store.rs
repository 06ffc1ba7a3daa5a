use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::OnceCell;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Value, json};

use crate::canonical::{DayOfWeek, DivisionLevel};
use crate::store::{
    DivisionRecord, DivisionRow, InternalId, MatchPage, MatchPageToken, MatchRecord, MatchRow,
    MatchStatus, SCAN_PAGE_SIZE, SeasonRecord, SeasonRow, Store, StoredWinner, TeamRecord, TeamRow,
    VenueRecord, VenueRow, WinnerBasis,
};

const REQUEST_TIMEOUT_SECS: u64 = 10;
const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";

static CLIENT: OnceCell<Client> = OnceCell::new();

fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")
    })
}

/// PostgREST-backed store. Tables mirror the sqlite schema with bigint
/// identity ids; every call is one filtered REST request, never raw SQL.
pub struct RestStore {
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn table_url(&self, table: &str, query: &str) -> String {
        format!("{}/rest/v1/{table}?{query}", self.base_url)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    fn get_rows(&self, table: &str, query: &str) -> Result<Vec<Value>> {
        let url = self.table_url(table, query);
        let resp = self
            .authed(http_client()?.get(&url))
            .send()
            .with_context(|| format!("GET {table} failed"))?;
        let status = resp.status();
        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {status} from {table}: {body}"));
        }
        let value: Value =
            serde_json::from_str(body.trim()).with_context(|| format!("invalid {table} json"))?;
        value
            .as_array()
            .cloned()
            .ok_or_else(|| anyhow!("expected json array from {table}"))
    }

    fn insert_rows(&self, table: &str, body: Value) -> Result<Vec<InternalId>> {
        let url = self.table_url(table, "select=id");
        let resp = self
            .authed(http_client()?.post(&url))
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .with_context(|| format!("POST {table} failed"))?;
        let status = resp.status();
        let text = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {status} inserting into {table}: {text}"));
        }
        let rows: Value =
            serde_json::from_str(text.trim()).with_context(|| format!("invalid {table} json"))?;
        let rows = rows
            .as_array()
            .ok_or_else(|| anyhow!("expected json array from {table} insert"))?;
        rows.iter()
            .map(|row| id_field(row))
            .collect::<Result<Vec<_>>>()
    }

    fn insert_row(&self, table: &str, body: Value) -> Result<InternalId> {
        let ids = self.insert_rows(table, Value::Array(vec![body]))?;
        ids.into_iter()
            .next()
            .ok_or_else(|| anyhow!("{table} insert returned no row"))
    }

    fn patch_by_id(&self, table: &str, id: InternalId, body: Value) -> Result<()> {
        let url = self.table_url(table, &format!("id=eq.{id}"));
        let resp = self
            .authed(http_client()?.patch(&url))
            .json(&body)
            .send()
            .with_context(|| format!("PATCH {table} failed"))?;
        let status = resp.status();
        if !status.is_success() && status != StatusCode::NO_CONTENT {
            let text = resp.text().unwrap_or_default();
            return Err(anyhow!("http {status} updating {table} id {id}: {text}"));
        }
        Ok(())
    }
}

fn id_field(row: &Value) -> Result<InternalId> {
    row.get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("row missing integer id: {row}"))
}

fn str_field(row: &Value, name: &str) -> Result<String> {
    row.get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("row missing text field {name}"))
}

fn i64_field(row: &Value, name: &str) -> Result<i64> {
    row.get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("row missing integer field {name}"))
}

fn opt_str_field(row: &Value, name: &str) -> Option<String> {
    row.get(name).and_then(Value::as_str).map(str::to_string)
}

fn date_field(row: &Value, name: &str) -> Result<NaiveDate> {
    let raw = str_field(row, name)?;
    NaiveDate::parse_from_str(&raw, DATE_FMT).with_context(|| format!("bad stored date {raw:?}"))
}

fn venue_from_row(row: &Value) -> Result<VenueRow> {
    Ok(VenueRow {
        id: id_field(row)?,
        record: VenueRecord {
            name: str_field(row, "name")?,
            slug: str_field(row, "slug")?,
            city: str_field(row, "city")?,
            state: str_field(row, "state")?,
            timezone: str_field(row, "timezone")?,
            website_url: str_field(row, "website_url")?,
        },
    })
}

fn team_from_row(row: &Value) -> Result<TeamRow> {
    Ok(TeamRow {
        id: id_field(row)?,
        venue_id: i64_field(row, "venue_id")?,
        record: TeamRecord {
            external_id: str_field(row, "external_id")?,
            name: str_field(row, "name")?,
            slug: str_field(row, "slug")?,
            rating: row.get("rating").and_then(Value::as_i64),
            all_time_wins: i64_field(row, "all_time_wins")? as u32,
            all_time_losses: i64_field(row, "all_time_losses")? as u32,
        },
    })
}

fn season_from_row(row: &Value) -> Result<SeasonRow> {
    Ok(SeasonRow {
        id: id_field(row)?,
        venue_id: i64_field(row, "venue_id")?,
        record: SeasonRecord {
            external_id: str_field(row, "external_id")?,
            name: str_field(row, "name")?,
            slug: str_field(row, "slug")?,
            start_date: date_field(row, "start_date")?,
        },
    })
}

fn division_from_row(row: &Value) -> Result<DivisionRow> {
    let day_raw = str_field(row, "day_of_week")?;
    let level_raw = str_field(row, "level")?;
    Ok(DivisionRow {
        id: id_field(row)?,
        season_id: i64_field(row, "season_id")?,
        record: DivisionRecord {
            external_id: str_field(row, "external_id")?,
            name: str_field(row, "name")?,
            slug: str_field(row, "slug")?,
            day_of_week: DayOfWeek::from_str_exact(&day_raw)
                .ok_or_else(|| anyhow!("bad stored day_of_week {day_raw:?}"))?,
            level: DivisionLevel::from_str_exact(&level_raw)
                .ok_or_else(|| anyhow!("bad stored level {level_raw:?}"))?,
        },
    })
}

fn match_from_row(row: &Value) -> Result<MatchRow> {
    let time_raw = str_field(row, "scheduled_time")?;
    let scheduled_time = NaiveTime::parse_from_str(&time_raw, TIME_FMT)
        .with_context(|| format!("bad stored time {time_raw:?}"))?;
    let winner = match row.get("winner_id").and_then(Value::as_i64) {
        Some(team_id) => {
            let basis = match opt_str_field(row, "winner_basis") {
                Some(raw) => WinnerBasis::from_str_exact(&raw)?,
                None => WinnerBasis::Single,
            };
            Some(StoredWinner { team_id, basis })
        }
        None => None,
    };
    Ok(MatchRow {
        id: id_field(row)?,
        record: MatchRecord {
            division_id: i64_field(row, "division_id")?,
            team_a_id: i64_field(row, "team_a_id")?,
            team_b_id: i64_field(row, "team_b_id")?,
            scheduled_date: date_field(row, "scheduled_date")?,
            scheduled_time,
            court: str_field(row, "court")?,
            status: MatchStatus::from_str_exact(&str_field(row, "status")?)?,
        },
        winner,
    })
}

fn team_body(venue_id: InternalId, record: &TeamRecord) -> Value {
    json!({
        "venue_id": venue_id,
        "external_id": record.external_id,
        "name": record.name,
        "slug": record.slug,
        "rating": record.rating,
        "all_time_wins": record.all_time_wins,
        "all_time_losses": record.all_time_losses,
    })
}

fn match_body(record: &MatchRecord) -> Value {
    json!({
        "division_id": record.division_id,
        "team_a_id": record.team_a_id,
        "team_b_id": record.team_b_id,
        "scheduled_date": record.scheduled_date.format(DATE_FMT).to_string(),
        "scheduled_time": record.scheduled_time.format(TIME_FMT).to_string(),
        "court": record.court,
        "status": record.status.as_str(),
    })
}

impl Store for RestStore {
    fn find_venue_by_slug(&mut self, slug: &str) -> Result<Option<VenueRow>> {
        let rows = self.get_rows("venues", &format!("slug=eq.{slug}&select=*"))?;
        rows.first().map(venue_from_row).transpose()
    }

    fn insert_venue(&mut self, record: &VenueRecord) -> Result<InternalId> {
        self.insert_row(
            "venues",
            json!({
                "name": record.name,
                "slug": record.slug,
                "city": record.city,
                "state": record.state,
                "timezone": record.timezone,
                "website_url": record.website_url,
            }),
        )
    }

    fn update_venue(&mut self, id: InternalId, record: &VenueRecord) -> Result<()> {
        self.patch_by_id(
            "venues",
            id,
            json!({
                "name": record.name,
                "city": record.city,
                "state": record.state,
                "timezone": record.timezone,
                "website_url": record.website_url,
            }),
        )
    }

    fn find_team_by_external_id(
        &mut self,
        venue_id: InternalId,
        external_id: &str,
    ) -> Result<Option<TeamRow>> {
        let rows = self.get_rows(
            "teams",
            &format!("venue_id=eq.{venue_id}&external_id=eq.{external_id}&select=*"),
        )?;
        rows.first().map(team_from_row).transpose()
    }

    fn find_team_by_slug(&mut self, venue_id: InternalId, slug: &str) -> Result<Option<TeamRow>> {
        let rows = self.get_rows(
            "teams",
            &format!("venue_id=eq.{venue_id}&slug=eq.{slug}&select=*"),
        )?;
        rows.first().map(team_from_row).transpose()
    }

    fn insert_team(&mut self, venue_id: InternalId, record: &TeamRecord) -> Result<InternalId> {
        self.insert_row("teams", team_body(venue_id, record))
    }

    fn update_team(&mut self, id: InternalId, record: &TeamRecord) -> Result<()> {
        self.patch_by_id(
            "teams",
            id,
            json!({
                "name": record.name,
                "slug": record.slug,
                "rating": record.rating,
                "all_time_wins": record.all_time_wins,
                "all_time_losses": record.all_time_losses,
            }),
        )
    }

    fn find_season_by_slug(
        &mut self,
        venue_id: InternalId,
        slug: &str,
    ) -> Result<Option<SeasonRow>> {
        let rows = self.get_rows(
            "seasons",
            &format!("venue_id=eq.{venue_id}&slug=eq.{slug}&select=*"),
        )?;
        rows.first().map(season_from_row).transpose()
    }

    fn insert_season(
        &mut self,
        venue_id: InternalId,
        record: &SeasonRecord,
    ) -> Result<InternalId> {
        self.insert_row(
            "seasons",
            json!({
                "venue_id": venue_id,
                "external_id": record.external_id,
                "name": record.name,
                "slug": record.slug,
                "start_date": record.start_date.format(DATE_FMT).to_string(),
            }),
        )
    }

    fn update_season(&mut self, id: InternalId, record: &SeasonRecord) -> Result<()> {
        self.patch_by_id(
            "seasons",
            id,
            json!({
                "name": record.name,
                "start_date": record.start_date.format(DATE_FMT).to_string(),
            }),
        )
    }

    fn find_division_by_slug(
        &mut self,
        season_id: InternalId,
        slug: &str,
    ) -> Result<Option<DivisionRow>> {
        let rows = self.get_rows(
            "divisions",
            &format!("season_id=eq.{season_id}&slug=eq.{slug}&select=*"),
        )?;
        rows.first().map(division_from_row).transpose()
    }

    fn insert_division(
        &mut self,
        season_id: InternalId,
        record: &DivisionRecord,
    ) -> Result<InternalId> {
        self.insert_row(
            "divisions",
            json!({
                "season_id": season_id,
                "external_id": record.external_id,
                "name": record.name,
                "slug": record.slug,
                "day_of_week": record.day_of_week.as_str(),
                "level": record.level.as_str(),
            }),
        )
    }

    fn update_division(&mut self, id: InternalId, record: &DivisionRecord) -> Result<()> {
        self.patch_by_id(
            "divisions",
            id,
            json!({
                "name": record.name,
                "day_of_week": record.day_of_week.as_str(),
                "level": record.level.as_str(),
            }),
        )
    }

    fn find_match(
        &mut self,
        division_id: InternalId,
        date: NaiveDate,
        team_a_id: InternalId,
        team_b_id: InternalId,
    ) -> Result<Option<MatchRow>> {
        let date = date.format(DATE_FMT);
        let query = format!(
            "division_id=eq.{division_id}&scheduled_date=eq.{date}\
             &or=(and(team_a_id.eq.{team_a_id},team_b_id.eq.{team_b_id}),\
             and(team_a_id.eq.{team_b_id},team_b_id.eq.{team_a_id}))&select=*"
        );
        let rows = self.get_rows("matches", &query)?;
        rows.first().map(match_from_row).transpose()
    }

    fn insert_matches(&mut self, records: &[MatchRecord]) -> Result<Vec<InternalId>> {
        let body = Value::Array(records.iter().map(match_body).collect());
        self.insert_rows("matches", body)
    }

    fn update_match(&mut self, id: InternalId, record: &MatchRecord) -> Result<()> {
        // Winner columns stay out of this body on purpose; see Store docs.
        self.patch_by_id(
            "matches",
            id,
            json!({
                "scheduled_time": record.scheduled_time.format(TIME_FMT).to_string(),
                "court": record.court,
                "status": record.status.as_str(),
            }),
        )
    }

    fn set_match_winner(&mut self, id: InternalId, winner: StoredWinner) -> Result<()> {
        self.patch_by_id(
            "matches",
            id,
            json!({
                "winner_id": winner.team_id,
                "winner_basis": winner.basis.as_str(),
                "status": MatchStatus::Completed.as_str(),
            }),
        )
    }

    fn scan_matches(&mut self, token: Option<MatchPageToken>) -> Result<MatchPage> {
        let offset = token.map(|t| t.0).unwrap_or(0);
        let rows = self.get_rows(
            "matches",
            &format!("select=*&order=id.asc&limit={SCAN_PAGE_SIZE}&offset={offset}"),
        )?;
        let rows = rows
            .iter()
            .map(match_from_row)
            .collect::<Result<Vec<_>>>()?;
        let next =
            (rows.len() == SCAN_PAGE_SIZE).then_some(MatchPageToken(offset + rows.len() as u64));
        Ok(MatchPage { rows, next })
    }
}
