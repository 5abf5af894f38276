use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;
use tracing::info;

use crate::cache::{Cache, memoize};
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::fetch::{Fetcher, PageFetcher};
use crate::parse::{parse_play_by_play, parse_schedule};
use crate::record::GameRecord;
use crate::types::{GameDate, GameId, GameQuery};

const PBP_URL: &str = "https://www.cbssports.com/nhl/gametracker/playbyplay";
const SCHEDULE_URL: &str = "https://www.cbssports.com/nhl/schedule";

pub fn play_by_play_url(game: &GameId) -> Result<String> {
    let date = game
        .date
        .ok_or_else(|| IngestError::Unscheduled(game.clone()))?;
    Ok(format!("{PBP_URL}/NHL_{date}_{}@{}", game.away, game.home))
}

pub fn schedule_url(date: GameDate) -> String {
    format!("{SCHEDULE_URL}/{date}/")
}

pub fn schedule_key(date: GameDate) -> String {
    format!("GAMES_FOR_DATE_{date}")
}

/// Cache-backed access to game records and schedules.
///
/// Every remote page goes through `memoize`, so anything already on disk is
/// never fetched again. Concurrent requests for the same key wait on a
/// per-key lock and then read what the first request cached.
pub struct GameStore<F: PageFetcher> {
    cache: Arc<dyn Cache>,
    fetcher: F,
    pool: Option<rayon::ThreadPool>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GameStore<Fetcher> {
    pub fn from_config(config: &IngestConfig) -> Self {
        GameStore::new(
            config.open_cache(),
            config.fetcher(),
            config.fetch_parallelism,
        )
    }
}

impl<F: PageFetcher> GameStore<F> {
    pub fn new(cache: Arc<dyn Cache>, fetcher: F, parallelism: usize) -> Self {
        Self {
            cache,
            fetcher,
            pool: build_fetch_pool(parallelism),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Returns the record for `game`, fetching and parsing only on a miss.
    pub fn get_game_record(&self, game: &GameId) -> Result<GameRecord> {
        let url = play_by_play_url(game)?;
        let key = game.to_string();
        self.with_key_lock(&key, || {
            memoize(self.cache.as_ref(), &key, || {
                info!(game = %game, "downloading play-by-play");
                let html = self.fetcher.fetch_page(&url)?;
                let events = parse_play_by_play(game, &html)?;
                Ok(GameRecord::new(game.clone(), events))
            })
        })
    }

    /// Games for one date or every date of a season, in date order.
    pub fn list_games(&self, query: GameQuery) -> Result<Vec<GameId>> {
        match query {
            GameQuery::Date(date) => self.games_on(date),
            GameQuery::Season(season) => {
                let mut games = Vec::new();
                for date in season.all_dates() {
                    games.extend(self.games_on(date)?);
                }
                Ok(games)
            }
        }
    }

    /// Lazily loads the record of every game matching `query`.
    pub fn games_data(
        &self,
        query: GameQuery,
    ) -> Result<impl Iterator<Item = Result<GameRecord>> + '_> {
        let games = self.list_games(query)?;
        Ok(games
            .into_iter()
            .map(move |game| self.get_game_record(&game)))
    }

    /// Loads many games on the fetch pool. Results keep the input order and
    /// one failure does not stop the others.
    pub fn load_games(&self, games: &[GameId]) -> Vec<Result<GameRecord>> {
        with_fetch_pool(&self.pool, || {
            games
                .par_iter()
                .map(|game| self.get_game_record(game))
                .collect()
        })
    }

    fn games_on(&self, date: GameDate) -> Result<Vec<GameId>> {
        let key = schedule_key(date);
        self.with_key_lock(&key, || {
            memoize(self.cache.as_ref(), &key, || {
                info!(date, "looking up games");
                let html = self.fetcher.fetch_page(&schedule_url(date))?;
                parse_schedule(date, &html)
            })
        })
    }

    fn with_key_lock<T>(&self, key: &str, work: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = {
            let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.to_string()).or_default().clone()
        };

        let result = {
            let _held = lock.lock().unwrap_or_else(PoisonError::into_inner);
            work()
        };

        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this call still hold it.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
        result
    }
}

fn build_fetch_pool(threads: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .ok()
}

fn with_fetch_pool<T>(pool: &Option<rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    if let Some(pool) = pool.as_ref() {
        pool.install(action)
    } else {
        action()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_source_layout() {
        let game = GameId::new(20181004, "BOS", "WAS");
        assert_eq!(
            play_by_play_url(&game).expect("dated"),
            "https://www.cbssports.com/nhl/gametracker/playbyplay/NHL_20181004_BOS@WAS"
        );
        assert_eq!(
            schedule_url(20181004),
            "https://www.cbssports.com/nhl/schedule/20181004/"
        );
        assert_eq!(schedule_key(20181004), "GAMES_FOR_DATE_20181004");
    }

    #[test]
    fn undated_game_cannot_be_fetched() {
        let game = GameId::matchup("BOS", "WAS");
        assert!(matches!(
            play_by_play_url(&game),
            Err(IngestError::Unscheduled(_))
        ));
    }
}
