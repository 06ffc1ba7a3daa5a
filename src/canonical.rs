use chrono::{NaiveDate, NaiveTime};

const SLUG_MAX_LEN: usize = 100;

/// Lowercase, drop everything that is not alphanumeric/space/hyphen, collapse
/// space and hyphen runs to a single `-`, truncate. Same input, same output.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_sep = false;
    for ch in text.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        } else if ch.is_whitespace() || ch == '-' {
            pending_sep = true;
        }
        // Any other character is stripped without becoming a separator.
    }
    out.chars().take(SLUG_MAX_LEN).collect()
}

/// Parse the date formats the source site is known to emit:
/// `October 3rd, 2023`, `10/3/2023`, `2023-10-03`. Ordinal suffixes are
/// stripped before matching. `None` means unparsable; the caller substitutes
/// its documented fallback (and should log that it did so).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let clean = strip_ordinal_suffixes(raw);
    for fmt in ["%B %d, %Y", "%m/%d/%Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(&clean, fmt) {
            return Some(date);
        }
    }
    None
}

/// Parse `7:30 PM`, `19:30:00` or `19:30`. `None` means unparsable.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let upper = raw.to_ascii_uppercase();
    for fmt in ["%I:%M %p", "%H:%M:%S", "%H:%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(&upper, fmt) {
            return Some(time);
        }
    }
    None
}

/// Remove `st`/`nd`/`rd`/`th` directly following a digit run, so
/// `October 3rd, 2023` becomes `October 3, 2023`.
fn strip_ordinal_suffixes(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < chars.len() {
        out.push(chars[i]);
        if chars[i].is_ascii_digit() {
            let next_is_digit = chars.get(i + 1).is_some_and(|c| c.is_ascii_digit());
            if !next_is_digit {
                let suffix: String = chars[i + 1..]
                    .iter()
                    .take(2)
                    .collect::<String>()
                    .to_ascii_lowercase();
                if matches!(suffix.as_str(), "st" | "nd" | "rd" | "th") {
                    i += 2;
                }
            }
        }
        i += 1;
    }
    out
}

/// Day a division plays on, inferred from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn as_str(self) -> &'static str {
        match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        }
    }

    pub fn from_str_exact(raw: &str) -> Option<Self> {
        DAY_VOCABULARY
            .iter()
            .find(|(name, _)| *name == raw)
            .map(|(_, day)| *day)
    }
}

/// Skill tier of a division, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DivisionLevel {
    Pilot,
    Cherry,
    Hammer,
    Party,
}

impl DivisionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            DivisionLevel::Pilot => "pilot",
            DivisionLevel::Cherry => "cherry",
            DivisionLevel::Hammer => "hammer",
            DivisionLevel::Party => "party",
        }
    }

    pub fn from_str_exact(raw: &str) -> Option<Self> {
        LEVEL_VOCABULARY
            .iter()
            .find(|(name, _)| *name == raw)
            .map(|(_, level)| *level)
    }
}

// Closed vocabularies. Substring inference below is a heuristic over these
// tables and nothing else; new site wording means a new table entry, not a
// behavior drift.
const DAY_VOCABULARY: &[(&str, DayOfWeek)] = &[
    ("monday", DayOfWeek::Monday),
    ("tuesday", DayOfWeek::Tuesday),
    ("wednesday", DayOfWeek::Wednesday),
    ("thursday", DayOfWeek::Thursday),
    ("friday", DayOfWeek::Friday),
    ("saturday", DayOfWeek::Saturday),
    ("sunday", DayOfWeek::Sunday),
];

const LEVEL_VOCABULARY: &[(&str, DivisionLevel)] = &[
    ("pilot", DivisionLevel::Pilot),
    ("cherry", DivisionLevel::Cherry),
    ("hammer", DivisionLevel::Hammer),
    ("party", DivisionLevel::Party),
];

pub const DEFAULT_DAY: DayOfWeek = DayOfWeek::Monday;
pub const DEFAULT_LEVEL: DivisionLevel = DivisionLevel::Pilot;

/// Infer `(day_of_week, level)` from a division name by case-insensitive
/// substring match against the fixed vocabularies, first match wins. Falls
/// back to `DEFAULT_DAY` / `DEFAULT_LEVEL` when nothing matches.
pub fn parse_division_attributes(name: &str) -> (DayOfWeek, DivisionLevel) {
    let lower = name.to_lowercase();

    let day = DAY_VOCABULARY
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, day)| *day)
        .unwrap_or(DEFAULT_DAY);

    let level = LEVEL_VOCABULARY
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, level)| *level)
        .unwrap_or(DEFAULT_LEVEL);

    (day, level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_strips_punctuation_and_collapses_runs() {
        assert_eq!(slugify("Monday Night — Cherry!!"), "monday-night-cherry");
        assert_eq!(slugify("  The   Ice  Holes "), "the-ice-holes");
        assert_eq!(slugify("Sweep -- The Leg"), "sweep-the-leg");
    }

    #[test]
    fn slugify_is_stable() {
        assert_eq!(slugify("Royal Palms Brooklyn"), slugify("Royal Palms Brooklyn"));
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn slugify_truncates() {
        let long = "a".repeat(300);
        assert_eq!(slugify(&long).len(), 100);
    }

    #[test]
    fn parse_date_known_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 10, 3).unwrap();
        assert_eq!(parse_date("October 3rd, 2023"), Some(expected));
        assert_eq!(parse_date("10/3/2023"), Some(expected));
        assert_eq!(parse_date("2023-10-03"), Some(expected));
        assert_eq!(parse_date("June 21st, 2022"), NaiveDate::from_ymd_opt(2022, 6, 21));
        assert_eq!(parse_date("August 22nd, 2022"), NaiveDate::from_ymd_opt(2022, 8, 22));
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("sometime soon"), None);
        assert_eq!(parse_date("13/45/2023"), None);
    }

    #[test]
    fn parse_time_formats() {
        let half_past_seven = NaiveTime::from_hms_opt(19, 30, 0).unwrap();
        assert_eq!(parse_time("7:30 PM"), Some(half_past_seven));
        assert_eq!(parse_time("7:30 pm"), Some(half_past_seven));
        assert_eq!(parse_time("19:30"), Some(half_past_seven));
        assert_eq!(parse_time("19:30:00"), Some(half_past_seven));
        assert_eq!(parse_time("late"), None);
    }

    #[test]
    fn division_attributes_match_vocabulary() {
        assert_eq!(
            parse_division_attributes("Wednesday Hammer A"),
            (DayOfWeek::Wednesday, DivisionLevel::Hammer)
        );
        assert_eq!(
            parse_division_attributes("SUNDAY PARTY LEAGUE"),
            (DayOfWeek::Sunday, DivisionLevel::Party)
        );
        assert_eq!(
            parse_division_attributes("Cherry Pickers"),
            (DEFAULT_DAY, DivisionLevel::Cherry)
        );
    }

    #[test]
    fn division_attributes_defaults() {
        assert_eq!(
            parse_division_attributes("Division 3"),
            (DEFAULT_DAY, DEFAULT_LEVEL)
        );
    }

    #[test]
    fn enum_round_trips() {
        for (name, _) in DAY_VOCABULARY {
            let day = DayOfWeek::from_str_exact(name).unwrap();
            assert_eq!(day.as_str(), *name);
        }
        for (name, _) in LEVEL_VOCABULARY {
            let level = DivisionLevel::from_str_exact(name).unwrap();
            assert_eq!(level.as_str(), *name);
        }
    }
}
