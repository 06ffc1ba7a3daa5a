use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveTime};

use crate::canonical::{DayOfWeek, DivisionLevel};

pub type InternalId = i64;

/// How many rows one scan page carries.
pub const SCAN_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueRecord {
    pub name: String,
    pub slug: String,
    pub city: String,
    pub state: String,
    pub timezone: String,
    pub website_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueRow {
    pub id: InternalId,
    pub record: VenueRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRecord {
    pub external_id: String,
    pub name: String,
    pub slug: String,
    pub rating: Option<i64>,
    pub all_time_wins: u32,
    pub all_time_losses: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRow {
    pub id: InternalId,
    pub venue_id: InternalId,
    pub record: TeamRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonRecord {
    pub external_id: String,
    pub name: String,
    pub slug: String,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonRow {
    pub id: InternalId,
    pub venue_id: InternalId,
    pub record: SeasonRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivisionRecord {
    pub external_id: String,
    pub name: String,
    pub slug: String,
    pub day_of_week: DayOfWeek,
    pub level: DivisionLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivisionRow {
    pub id: InternalId,
    pub season_id: InternalId,
    pub record: DivisionRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Scheduled,
    Completed,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Completed => "completed",
        }
    }

    pub fn from_str_exact(raw: &str) -> Result<Self> {
        match raw {
            "scheduled" => Ok(MatchStatus::Scheduled),
            "completed" => Ok(MatchStatus::Completed),
            other => Err(anyhow!("unknown match status {other:?}")),
        }
    }
}

/// Strength of the verdict a stored winner came from. `Single` (one side
/// reported) may later be upgraded to `Confirmed` (both sides agreed); the
/// reverse never happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WinnerBasis {
    Single,
    Confirmed,
}

impl WinnerBasis {
    pub fn as_str(self) -> &'static str {
        match self {
            WinnerBasis::Single => "single",
            WinnerBasis::Confirmed => "confirmed",
        }
    }

    pub fn from_str_exact(raw: &str) -> Result<Self> {
        match raw {
            "single" => Ok(WinnerBasis::Single),
            "confirmed" => Ok(WinnerBasis::Confirmed),
            other => Err(anyhow!("unknown winner basis {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredWinner {
    pub team_id: InternalId,
    pub basis: WinnerBasis,
}

/// Mutable fields of a match. The winner is deliberately not part of this
/// record: winner attachment has its own precedence rules and its own store
/// call, so a plain field refresh can never clobber an earlier verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub division_id: InternalId,
    pub team_a_id: InternalId,
    pub team_b_id: InternalId,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub court: String,
    pub status: MatchStatus,
}

impl MatchRecord {
    /// Unordered pair equality for natural-key comparisons.
    pub fn same_pair(&self, team_a: InternalId, team_b: InternalId) -> bool {
        (self.team_a_id == team_a && self.team_b_id == team_b)
            || (self.team_a_id == team_b && self.team_b_id == team_a)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRow {
    pub id: InternalId,
    pub record: MatchRecord,
    pub winner: Option<StoredWinner>,
}

/// Continuation token for `scan_matches`. Opaque to callers; each backend
/// interprets it as its own offset. Restarting a scan is just passing `None`
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPageToken(pub(crate) u64);

#[derive(Debug, Clone)]
pub struct MatchPage {
    pub rows: Vec<MatchRow>,
    pub next: Option<MatchPageToken>,
}

/// The persistent-store collaborator. The sync engine only ever talks through
/// these natural-key primitives; constraint enforcement and storage details
/// stay on the other side of this trait.
pub trait Store {
    fn find_venue_by_slug(&mut self, slug: &str) -> Result<Option<VenueRow>>;
    fn insert_venue(&mut self, record: &VenueRecord) -> Result<InternalId>;
    fn update_venue(&mut self, id: InternalId, record: &VenueRecord) -> Result<()>;

    fn find_team_by_external_id(
        &mut self,
        venue_id: InternalId,
        external_id: &str,
    ) -> Result<Option<TeamRow>>;
    fn find_team_by_slug(&mut self, venue_id: InternalId, slug: &str) -> Result<Option<TeamRow>>;
    fn insert_team(&mut self, venue_id: InternalId, record: &TeamRecord) -> Result<InternalId>;
    fn update_team(&mut self, id: InternalId, record: &TeamRecord) -> Result<()>;

    fn find_season_by_slug(&mut self, venue_id: InternalId, slug: &str)
    -> Result<Option<SeasonRow>>;
    fn insert_season(&mut self, venue_id: InternalId, record: &SeasonRecord)
    -> Result<InternalId>;
    fn update_season(&mut self, id: InternalId, record: &SeasonRecord) -> Result<()>;

    fn find_division_by_slug(
        &mut self,
        season_id: InternalId,
        slug: &str,
    ) -> Result<Option<DivisionRow>>;
    fn insert_division(
        &mut self,
        season_id: InternalId,
        record: &DivisionRecord,
    ) -> Result<InternalId>;
    fn update_division(&mut self, id: InternalId, record: &DivisionRecord) -> Result<()>;

    /// Natural-key lookup: division + date + unordered team pair.
    fn find_match(
        &mut self,
        division_id: InternalId,
        date: NaiveDate,
        team_a_id: InternalId,
        team_b_id: InternalId,
    ) -> Result<Option<MatchRow>>;
    fn insert_matches(&mut self, records: &[MatchRecord]) -> Result<Vec<InternalId>>;
    fn update_match(&mut self, id: InternalId, record: &MatchRecord) -> Result<()>;
    /// Sets the winner and basis, and flips the match to completed.
    fn set_match_winner(&mut self, id: InternalId, winner: StoredWinner) -> Result<()>;
    fn scan_matches(&mut self, token: Option<MatchPageToken>) -> Result<MatchPage>;
}

/// In-memory store double for tests and dry runs. Same contract, no I/O;
/// `fail_next_batch_inserts` lets a test script transient batch failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    next_id: InternalId,
    pub venues: Vec<VenueRow>,
    pub teams: Vec<TeamRow>,
    pub seasons: Vec<SeasonRow>,
    pub divisions: Vec<DivisionRow>,
    pub matches: Vec<MatchRow>,
    pub fail_next_batch_inserts: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> InternalId {
        self.next_id += 1;
        self.next_id
    }
}

impl Store for MemoryStore {
    fn find_venue_by_slug(&mut self, slug: &str) -> Result<Option<VenueRow>> {
        Ok(self.venues.iter().find(|v| v.record.slug == slug).cloned())
    }

    fn insert_venue(&mut self, record: &VenueRecord) -> Result<InternalId> {
        let id = self.next_id();
        self.venues.push(VenueRow {
            id,
            record: record.clone(),
        });
        Ok(id)
    }

    fn update_venue(&mut self, id: InternalId, record: &VenueRecord) -> Result<()> {
        let venue = self
            .venues
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| anyhow!("no venue {id}"))?;
        venue.record = record.clone();
        Ok(())
    }

    fn find_team_by_external_id(
        &mut self,
        venue_id: InternalId,
        external_id: &str,
    ) -> Result<Option<TeamRow>> {
        Ok(self
            .teams
            .iter()
            .find(|t| t.venue_id == venue_id && t.record.external_id == external_id)
            .cloned())
    }

    fn find_team_by_slug(&mut self, venue_id: InternalId, slug: &str) -> Result<Option<TeamRow>> {
        Ok(self
            .teams
            .iter()
            .find(|t| t.venue_id == venue_id && t.record.slug == slug)
            .cloned())
    }

    fn insert_team(&mut self, venue_id: InternalId, record: &TeamRecord) -> Result<InternalId> {
        let id = self.next_id();
        self.teams.push(TeamRow {
            id,
            venue_id,
            record: record.clone(),
        });
        Ok(id)
    }

    fn update_team(&mut self, id: InternalId, record: &TeamRecord) -> Result<()> {
        let team = self
            .teams
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| anyhow!("no team {id}"))?;
        team.record = record.clone();
        Ok(())
    }

    fn find_season_by_slug(
        &mut self,
        venue_id: InternalId,
        slug: &str,
    ) -> Result<Option<SeasonRow>> {
        Ok(self
            .seasons
            .iter()
            .find(|s| s.venue_id == venue_id && s.record.slug == slug)
            .cloned())
    }

    fn insert_season(
        &mut self,
        venue_id: InternalId,
        record: &SeasonRecord,
    ) -> Result<InternalId> {
        let id = self.next_id();
        self.seasons.push(SeasonRow {
            id,
            venue_id,
            record: record.clone(),
        });
        Ok(id)
    }

    fn update_season(&mut self, id: InternalId, record: &SeasonRecord) -> Result<()> {
        let season = self
            .seasons
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| anyhow!("no season {id}"))?;
        season.record = record.clone();
        Ok(())
    }

    fn find_division_by_slug(
        &mut self,
        season_id: InternalId,
        slug: &str,
    ) -> Result<Option<DivisionRow>> {
        Ok(self
            .divisions
            .iter()
            .find(|d| d.season_id == season_id && d.record.slug == slug)
            .cloned())
    }

    fn insert_division(
        &mut self,
        season_id: InternalId,
        record: &DivisionRecord,
    ) -> Result<InternalId> {
        let id = self.next_id();
        self.divisions.push(DivisionRow {
            id,
            season_id,
            record: record.clone(),
        });
        Ok(id)
    }

    fn update_division(&mut self, id: InternalId, record: &DivisionRecord) -> Result<()> {
        let division = self
            .divisions
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| anyhow!("no division {id}"))?;
        division.record = record.clone();
        Ok(())
    }

    fn find_match(
        &mut self,
        division_id: InternalId,
        date: NaiveDate,
        team_a_id: InternalId,
        team_b_id: InternalId,
    ) -> Result<Option<MatchRow>> {
        Ok(self
            .matches
            .iter()
            .find(|m| {
                m.record.division_id == division_id
                    && m.record.scheduled_date == date
                    && m.record.same_pair(team_a_id, team_b_id)
            })
            .cloned())
    }

    fn insert_matches(&mut self, records: &[MatchRecord]) -> Result<Vec<InternalId>> {
        if self.fail_next_batch_inserts > 0 {
            self.fail_next_batch_inserts -= 1;
            return Err(anyhow!("simulated batch insert failure"));
        }
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let id = self.next_id();
            self.matches.push(MatchRow {
                id,
                record: record.clone(),
                winner: None,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    fn update_match(&mut self, id: InternalId, record: &MatchRecord) -> Result<()> {
        let row = self
            .matches
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| anyhow!("no match {id}"))?;
        row.record = record.clone();
        Ok(())
    }

    fn set_match_winner(&mut self, id: InternalId, winner: StoredWinner) -> Result<()> {
        let row = self
            .matches
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| anyhow!("no match {id}"))?;
        row.winner = Some(winner);
        row.record.status = MatchStatus::Completed;
        Ok(())
    }

    fn scan_matches(&mut self, token: Option<MatchPageToken>) -> Result<MatchPage> {
        let offset = token.map(|t| t.0 as usize).unwrap_or(0);
        let rows: Vec<MatchRow> = self
            .matches
            .iter()
            .skip(offset)
            .take(SCAN_PAGE_SIZE)
            .cloned()
            .collect();
        let consumed = offset + rows.len();
        let next = (consumed < self.matches.len()).then_some(MatchPageToken(consumed as u64));
        Ok(MatchPage { rows, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn match_record(division_id: InternalId, a: InternalId, b: InternalId) -> MatchRecord {
        MatchRecord {
            division_id,
            team_a_id: a,
            team_b_id: b,
            scheduled_date: NaiveDate::from_ymd_opt(2023, 10, 3).unwrap(),
            scheduled_time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            court: "Court 1".to_string(),
            status: MatchStatus::Scheduled,
        }
    }

    #[test]
    fn find_match_ignores_pair_order() {
        let mut store = MemoryStore::new();
        let ids = store.insert_matches(&[match_record(1, 10, 11)]).unwrap();
        let date = NaiveDate::from_ymd_opt(2023, 10, 3).unwrap();
        let found = store.find_match(1, date, 11, 10).unwrap().unwrap();
        assert_eq!(found.id, ids[0]);
    }

    #[test]
    fn scan_pages_through_everything_once() {
        let mut store = MemoryStore::new();
        let records: Vec<MatchRecord> = (0..(SCAN_PAGE_SIZE + 7))
            .map(|i| match_record(1, i as InternalId * 2, i as InternalId * 2 + 1))
            .collect();
        store.insert_matches(&records).unwrap();

        let mut seen = 0;
        let mut token = None;
        loop {
            let page = store.scan_matches(token).unwrap();
            seen += page.rows.len();
            match page.next {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        assert_eq!(seen, SCAN_PAGE_SIZE + 7);
    }

    #[test]
    fn set_winner_completes_the_match() {
        let mut store = MemoryStore::new();
        let ids = store.insert_matches(&[match_record(1, 10, 11)]).unwrap();
        store
            .set_match_winner(
                ids[0],
                StoredWinner {
                    team_id: 10,
                    basis: WinnerBasis::Confirmed,
                },
            )
            .unwrap();
        let row = store.matches[0].clone();
        assert_eq!(row.record.status, MatchStatus::Completed);
        assert_eq!(row.winner.map(|w| w.team_id), Some(10));
    }
}
