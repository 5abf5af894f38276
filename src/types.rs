use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Calendar date encoded as `YYYYMMDD`.
pub type GameDate = u32;

/// Short team code as it appears in source URLs (e.g. `BOS`, `TB`).
pub type TeamCode = String;

/// Team codes tracked by downstream models. Should match the short names in
/// `https://www.cbssports.com/nhl/teams/` URLs.
pub const ALL_TEAMS: &[&str] = &[
    "CAR", "CHI", "CLB", "DAL", "DET", "FLA", "NSH", "TB", "BOS", "BUF", "NYI", "NYR", "NJ",
    "PHI", "PIT", "WAS", "CGY", "EDM", "MON", "OTT", "TOR", "VAN", "WPG", "ANA", "ARI", "COL",
    "LA", "MIN", "SJ", "STL", "LV",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameId {
    pub home: TeamCode,
    pub away: TeamCode,
    pub date: Option<GameDate>,
}

impl GameId {
    pub fn new(date: GameDate, away: impl Into<TeamCode>, home: impl Into<TeamCode>) -> Self {
        Self {
            home: home.into(),
            away: away.into(),
            date: Some(date),
        }
    }

    /// A matchup with no date, used as a prediction query key.
    pub fn matchup(away: impl Into<TeamCode>, home: impl Into<TeamCode>) -> Self {
        Self {
            home: home.into(),
            away: away.into(),
            date: None,
        }
    }

    pub fn is_tracked(&self) -> bool {
        ALL_TEAMS.contains(&self.home.as_str()) && ALL_TEAMS.contains(&self.away.as_str())
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.date {
            Some(date) => write!(f, "{date}_{}@{}", self.away, self.home),
            None => write!(f, "{}@{}", self.away, self.home),
        }
    }
}

/// A hockey season, keyed by the year it starts in (2018 for 2018-19).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Season {
    pub year: i32,
}

impl Season {
    pub fn new(year: i32) -> Self {
        Self { year }
    }

    /// Every date from October 1 through April 30 of the following year.
    ///
    /// May include dates without games, never dates from another season.
    pub fn all_dates(&self) -> Vec<GameDate> {
        let (Some(start), Some(end)) = (
            NaiveDate::from_ymd_opt(self.year, 10, 1),
            NaiveDate::from_ymd_opt(self.year + 1, 4, 30),
        ) else {
            return Vec::new();
        };
        start
            .iter_days()
            .take_while(|day| *day <= end)
            .map(date_to_int)
            .collect()
    }
}

fn date_to_int(day: NaiveDate) -> GameDate {
    day.year() as u32 * 10_000 + day.month() * 100 + day.day()
}

/// What `GameStore::list_games` should resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameQuery {
    Date(GameDate),
    Season(Season),
}

/// Time within a game: whole seconds elapsed since the start of `period`.
///
/// Field order gives chronological ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HockeyTime {
    pub period: i32,
    pub seconds: u32,
}

impl HockeyTime {
    pub fn new(period: i32, seconds: u32) -> Self {
        Self { period, seconds }
    }

    /// Parses a clock in `MM:SS` or `SS.fraction` form. The fractional form
    /// truncates to whole seconds.
    pub fn parse(period: i32, clock: &str) -> Result<Self> {
        let clock = clock.trim();
        let malformed = || IngestError::MalformedTime(clock.to_string());

        let seconds = if let Some((minutes, seconds)) = clock.split_once(':') {
            let minutes = parse_digits(minutes).ok_or_else(malformed)?;
            let seconds = parse_digits(seconds).ok_or_else(malformed)?;
            if seconds >= 60 {
                return Err(malformed());
            }
            minutes
                .checked_mul(60)
                .and_then(|total| total.checked_add(seconds))
                .ok_or_else(malformed)?
        } else if let Some((whole, fraction)) = clock.split_once('.') {
            if !fraction.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            parse_digits(whole).ok_or_else(malformed)?
        } else {
            return Err(malformed());
        };

        Ok(Self { period, seconds })
    }
}

fn parse_digits(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayKind {
    EndOfPeriod,
    Goal,
    FaceOff,
    Shot,
}

/// One play kept from the play-by-play feed. `team` is the side that scored,
/// shot, or won the face-off; it is `None` only for `EndOfPeriod`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayEvent {
    pub game: GameId,
    pub time: HockeyTime,
    pub kind: PlayKind,
    pub team: Option<TeamCode>,
}

impl PlayEvent {
    pub fn end_of_period(game: GameId, period: i32) -> Self {
        Self {
            game,
            time: HockeyTime::new(period, 20 * 60),
            kind: PlayKind::EndOfPeriod,
            team: None,
        }
    }

    pub fn is_attempt(&self) -> bool {
        matches!(self.kind, PlayKind::Goal | PlayKind::Shot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minute_clock() {
        let time = HockeyTime::parse(2, "12:34").expect("valid clock");
        assert_eq!(time, HockeyTime::new(2, 754));
    }

    #[test]
    fn truncates_fractional_clock() {
        let time = HockeyTime::parse(1, " 45.9 ").expect("valid clock");
        assert_eq!(time.seconds, 45);
    }

    #[test]
    fn rejects_garbage_clock() {
        for raw in ["", "abc", "12:", ":30", "1:75", "4.x", "--", "71582789:00"] {
            assert!(
                matches!(HockeyTime::parse(1, raw), Err(IngestError::MalformedTime(_))),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn time_orders_by_period_then_seconds() {
        assert!(HockeyTime::new(1, 1199) < HockeyTime::new(2, 0));
        assert!(HockeyTime::new(3, 10) < HockeyTime::new(3, 11));
    }

    #[test]
    fn game_ids_differ_by_date() {
        let a = GameId::new(20181004, "BOS", "WAS");
        let b = GameId::new(20190110, "BOS", "WAS");
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "20181004_BOS@WAS");
        assert_eq!(GameId::matchup("BOS", "WAS").to_string(), "BOS@WAS");
    }

    #[test]
    fn season_spans_october_to_april() {
        let dates = Season::new(2018).all_dates();
        assert_eq!(dates.first(), Some(&20181001));
        assert_eq!(dates.last(), Some(&20190430));
        assert!(dates.contains(&20181231));
        assert!(dates.contains(&20190101));
        assert!(!dates.contains(&20190501));
        assert_eq!(dates.len(), 212);
    }
}
