use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::canonical::parse_date;
use crate::document::RawTeamResult;

/// One team's report of one match, already canonicalized. Transient input to
/// the resolver; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchObservation {
    pub team_id: String,
    pub opponent_id: String,
    pub date: NaiveDate,
    pub result: ObservedResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedResult {
    Won,
    Lost,
    Unknown,
    Absent,
}

impl ObservedResult {
    fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            Some("won") => ObservedResult::Won,
            Some("lost") => ObservedResult::Lost,
            Some("unknown") => ObservedResult::Unknown,
            _ => ObservedResult::Absent,
        }
    }

    fn is_informative(self) -> bool {
        matches!(self, ObservedResult::Won | ObservedResult::Lost)
    }
}

/// Identity of one physical contest: date plus the unordered team pair. Both
/// sides' observations of the same match collapse onto the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchKey {
    pub date: NaiveDate,
    pub team_lo: String,
    pub team_hi: String,
}

impl MatchKey {
    pub fn new(date: NaiveDate, team_a: &str, team_b: &str) -> Self {
        let (team_lo, team_hi) = if team_a <= team_b {
            (team_a.to_string(), team_b.to_string())
        } else {
            (team_b.to_string(), team_a.to_string())
        };
        Self { date, team_lo, team_hi }
    }
}

/// Resolver output for one canonical key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// `confirmed` means both sides reported and agreed; a single-sided
    /// report is a weaker basis and can later be upgraded.
    Winner { team_id: String, confirmed: bool },
    /// The two sides contradict each other. Deliberately never broken by
    /// processing order; the old importer let the last-processed team's claim
    /// win and that is exactly the defect this variant replaces.
    Unresolved,
    NoData,
}

/// Build observations from raw team-page rows. Rows with an unparsable date
/// are dropped here since without a date there is no canonical key to group
/// them under.
pub fn observations_from_raw(rows: &[RawTeamResult]) -> Vec<MatchObservation> {
    rows.iter()
        .filter_map(|row| {
            let date = parse_date(&row.date)?;
            Some(MatchObservation {
                team_id: row.team_id.clone(),
                opponent_id: row.opponent_id.clone(),
                date,
                result: ObservedResult::from_raw(row.result.as_deref()),
            })
        })
        .collect()
}

/// Merge per-team observations into one verdict per physical match.
///
/// Policy: group by canonical key, discard uninformative results, then
/// - no informative reports        -> NoData
/// - one side reported             -> that side's implied winner, unconfirmed
/// - both sides agree              -> that winner, confirmed
/// - reports imply different teams -> Unresolved
///
/// Input order never influences the outcome.
pub fn resolve_winners(observations: &[MatchObservation]) -> BTreeMap<MatchKey, Verdict> {
    // key -> reporting team -> implied winner(s). BTreeMaps keep iteration
    // deterministic; the per-reporter inner map collapses duplicate rows from
    // the same team page into a single voice.
    let mut grouped: BTreeMap<MatchKey, BTreeMap<String, Vec<String>>> = BTreeMap::new();

    for obs in observations {
        let key = MatchKey::new(obs.date, &obs.team_id, &obs.opponent_id);
        let reporters = grouped.entry(key).or_default();
        let implied = match obs.result {
            ObservedResult::Won => obs.team_id.clone(),
            ObservedResult::Lost => obs.opponent_id.clone(),
            // Uninformative rows still register the key so it resolves to
            // NoData instead of silently vanishing.
            ObservedResult::Unknown | ObservedResult::Absent => continue,
        };
        reporters.entry(obs.team_id.clone()).or_default().push(implied);
    }

    let mut verdicts = BTreeMap::new();
    for (key, reporters) in grouped {
        verdicts.insert(key, merge_reports(&reporters));
    }
    verdicts
}

fn merge_reports(reporters: &BTreeMap<String, Vec<String>>) -> Verdict {
    let mut implied: Vec<&str> = Vec::new();
    for winners in reporters.values() {
        let first = winners[0].as_str();
        // A team page contradicting itself about the same match is as
        // unresolvable as the two teams disagreeing.
        if winners.iter().any(|w| w != first) {
            return Verdict::Unresolved;
        }
        implied.push(first);
    }

    match implied.as_slice() {
        [] => Verdict::NoData,
        [only] => Verdict::Winner {
            team_id: (*only).to_string(),
            confirmed: false,
        },
        [first, rest @ ..] => {
            if rest.iter().all(|w| w == first) {
                Verdict::Winner {
                    team_id: (*first).to_string(),
                    confirmed: true,
                }
            } else {
                Verdict::Unresolved
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(team: &str, opp: &str, result: ObservedResult) -> MatchObservation {
        MatchObservation {
            team_id: team.to_string(),
            opponent_id: opp.to_string(),
            date: NaiveDate::from_ymd_opt(2023, 10, 3).unwrap(),
            result,
        }
    }

    fn key(team_a: &str, team_b: &str) -> MatchKey {
        MatchKey::new(
            NaiveDate::from_ymd_opt(2023, 10, 3).unwrap(),
            team_a,
            team_b,
        )
    }

    #[test]
    fn key_is_order_independent() {
        assert_eq!(key("t1", "t2"), key("t2", "t1"));
    }

    #[test]
    fn agreeing_sides_confirm_the_winner() {
        let verdicts = resolve_winners(&[
            obs("t1", "t2", ObservedResult::Won),
            obs("t2", "t1", ObservedResult::Lost),
        ]);
        assert_eq!(
            verdicts.get(&key("t1", "t2")),
            Some(&Verdict::Winner {
                team_id: "t1".to_string(),
                confirmed: true
            })
        );
    }

    #[test]
    fn single_sided_report_is_accepted_unconfirmed() {
        let verdicts = resolve_winners(&[obs("t1", "t2", ObservedResult::Won)]);
        assert_eq!(
            verdicts.get(&key("t1", "t2")),
            Some(&Verdict::Winner {
                team_id: "t1".to_string(),
                confirmed: false
            })
        );

        let verdicts = resolve_winners(&[obs("t2", "t1", ObservedResult::Lost)]);
        assert_eq!(
            verdicts.get(&key("t1", "t2")),
            Some(&Verdict::Winner {
                team_id: "t1".to_string(),
                confirmed: false
            })
        );
    }

    #[test]
    fn contradiction_is_unresolved_in_both_orders() {
        let a = obs("t1", "t2", ObservedResult::Won);
        let b = obs("t2", "t1", ObservedResult::Won);

        let forward = resolve_winners(&[a.clone(), b.clone()]);
        let backward = resolve_winners(&[b, a]);
        assert_eq!(forward.get(&key("t1", "t2")), Some(&Verdict::Unresolved));
        assert_eq!(forward, backward);
    }

    #[test]
    fn uninformative_results_are_no_data() {
        let verdicts = resolve_winners(&[
            obs("t1", "t2", ObservedResult::Unknown),
            obs("t2", "t1", ObservedResult::Absent),
        ]);
        assert_eq!(verdicts.get(&key("t1", "t2")), Some(&Verdict::NoData));
    }

    #[test]
    fn self_contradicting_reporter_is_unresolved() {
        let verdicts = resolve_winners(&[
            obs("t1", "t2", ObservedResult::Won),
            obs("t1", "t2", ObservedResult::Lost),
        ]);
        assert_eq!(verdicts.get(&key("t1", "t2")), Some(&Verdict::Unresolved));
    }

    #[test]
    fn duplicate_agreeing_rows_stay_single_voice() {
        // Two rows from the same team page do not fake a confirmation.
        let verdicts = resolve_winners(&[
            obs("t1", "t2", ObservedResult::Won),
            obs("t1", "t2", ObservedResult::Won),
        ]);
        assert_eq!(
            verdicts.get(&key("t1", "t2")),
            Some(&Verdict::Winner {
                team_id: "t1".to_string(),
                confirmed: false
            })
        );
    }

    #[test]
    fn raw_rows_without_dates_are_dropped() {
        let rows = vec![
            RawTeamResult {
                team_id: "t1".to_string(),
                opponent_id: "t2".to_string(),
                date: "no idea".to_string(),
                result: Some("won".to_string()),
            },
            RawTeamResult {
                team_id: "t1".to_string(),
                opponent_id: "t2".to_string(),
                date: "10/3/2023".to_string(),
                result: Some("lost".to_string()),
            },
        ];
        let observations = observations_from_raw(&rows);
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].result, ObservedResult::Lost);
    }
}
