use serde::{Deserialize, Serialize};

use crate::types::{GameId, PlayEvent, PlayKind, TeamCode};

/// Parsed play-by-play for one game, with summary statistics.
///
/// Statistics are computed once at construction from `events` and never
/// change afterwards. Only `game` and `events` are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredRecord", into = "StoredRecord")]
pub struct GameRecord {
    game: GameId,
    events: Vec<PlayEvent>,
    stats: GameStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct GameStats {
    away_attempts: u32,
    home_attempts: u32,
    away_score: u32,
    home_score: u32,
}

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    game: GameId,
    events: Vec<PlayEvent>,
}

impl From<StoredRecord> for GameRecord {
    fn from(stored: StoredRecord) -> Self {
        GameRecord::new(stored.game, stored.events)
    }
}

impl From<GameRecord> for StoredRecord {
    fn from(record: GameRecord) -> Self {
        StoredRecord {
            game: record.game,
            events: record.events,
        }
    }
}

impl GameRecord {
    pub fn new(game: GameId, events: Vec<PlayEvent>) -> Self {
        let stats = tally(&game, &events);
        Self {
            game,
            events,
            stats,
        }
    }

    pub fn game(&self) -> &GameId {
        &self.game
    }

    pub fn events(&self) -> &[PlayEvent] {
        &self.events
    }

    /// Shots plus goals taken by the away side.
    pub fn away_attempts(&self) -> u32 {
        self.stats.away_attempts
    }

    pub fn home_attempts(&self) -> u32 {
        self.stats.home_attempts
    }

    pub fn away_score(&self) -> u32 {
        self.stats.away_score
    }

    pub fn home_score(&self) -> u32 {
        self.stats.home_score
    }

    /// Team with strictly more goals; `None` on a tie.
    pub fn winner(&self) -> Option<&TeamCode> {
        match self.stats.away_score.cmp(&self.stats.home_score) {
            std::cmp::Ordering::Greater => Some(&self.game.away),
            std::cmp::Ordering::Less => Some(&self.game.home),
            std::cmp::Ordering::Equal => None,
        }
    }
}

fn tally(game: &GameId, events: &[PlayEvent]) -> GameStats {
    let mut stats = GameStats::default();
    for event in events {
        let Some(team) = event.team.as_deref() else {
            continue;
        };
        let is_away = team == game.away;
        let is_home = team == game.home;
        if event.is_attempt() {
            if is_away {
                stats.away_attempts += 1;
            } else if is_home {
                stats.home_attempts += 1;
            }
        }
        if event.kind == PlayKind::Goal {
            if is_away {
                stats.away_score += 1;
            } else if is_home {
                stats.home_score += 1;
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HockeyTime;

    fn play(game: &GameId, seconds: u32, kind: PlayKind, team: &str) -> PlayEvent {
        PlayEvent {
            game: game.clone(),
            time: HockeyTime::new(1, seconds),
            kind,
            team: Some(team.to_string()),
        }
    }

    #[test]
    fn tied_game_has_no_winner() {
        let game = GameId::new(20181004, "BOS", "WAS");
        let events = vec![
            play(&game, 10, PlayKind::Goal, "BOS"),
            play(&game, 20, PlayKind::Shot, "BOS"),
            play(&game, 30, PlayKind::Goal, "WAS"),
            play(&game, 40, PlayKind::FaceOff, "WAS"),
        ];
        let record = GameRecord::new(game, events);
        assert_eq!(record.away_score(), 1);
        assert_eq!(record.home_score(), 1);
        assert_eq!(record.away_attempts(), 2);
        assert_eq!(record.home_attempts(), 1);
        assert_eq!(record.winner(), None);
    }

    #[test]
    fn winner_is_side_with_more_goals() {
        let game = GameId::new(20181004, "BOS", "WAS");
        let events = vec![
            play(&game, 10, PlayKind::Goal, "WAS"),
            play(&game, 30, PlayKind::Goal, "WAS"),
            play(&game, 50, PlayKind::Goal, "BOS"),
            PlayEvent::end_of_period(game.clone(), 1),
        ];
        let record = GameRecord::new(game, events);
        assert_eq!(record.winner().map(String::as_str), Some("WAS"));
    }

    #[test]
    fn stats_survive_serde_without_being_stored() {
        let game = GameId::new(20181004, "BOS", "WAS");
        let record = GameRecord::new(game.clone(), vec![play(&game, 5, PlayKind::Goal, "BOS")]);
        let json = serde_json::to_value(&record).expect("encode");
        assert!(json.get("stats").is_none());
        let back: GameRecord = serde_json::from_value(json).expect("decode");
        assert_eq!(back, record);
        assert_eq!(back.away_score(), 1);
    }
}
