use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};
use crate::fetch::PageFetcher;
use crate::store::GameStore;
use crate::types::{GameId, GameQuery, Season};

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

/// Chronological train/test split of a season's games.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainTest {
    pub train: Vec<GameId>,
    pub test: Vec<GameId>,
}

/// Splits `games` at `floor(len * (1 - test_fraction))`; the earlier games
/// train, the rest test. No shuffling.
pub fn split_games(games: Vec<GameId>, test_fraction: f64) -> Result<TrainTest> {
    check_fraction(test_fraction)?;
    let cutoff = ((games.len() as f64) * (1.0 - test_fraction)).floor() as usize;
    let mut train = games;
    let test = train.split_off(cutoff.min(train.len()));
    Ok(TrainTest { train, test })
}

/// Resolves every game of `season` through the store and splits it.
pub fn build_dataset<F: PageFetcher>(
    store: &GameStore<F>,
    season: Season,
    test_fraction: f64,
) -> Result<TrainTest> {
    check_fraction(test_fraction)?;
    let games = store.list_games(GameQuery::Season(season))?;
    split_games(games, test_fraction)
}

/// Accepts only fractions strictly between 0 and 1; NaN is rejected.
pub fn check_fraction(test_fraction: f64) -> Result<()> {
    if test_fraction > 0.0 && test_fraction < 1.0 {
        Ok(())
    } else {
        Err(IngestError::InvalidFraction(test_fraction))
    }
}
