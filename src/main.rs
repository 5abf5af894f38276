use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use puckcache::config::IngestConfig;
use puckcache::dataset::{DEFAULT_TEST_FRACTION, check_fraction, split_games};
use puckcache::store::GameStore;
use puckcache::types::{GameQuery, Season};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let query = parse_query_arg(&args)?;
    let test_fraction = match arg_value(&args, "--test-fraction") {
        Some(raw) => raw
            .parse::<f64>()
            .with_context(|| format!("invalid --test-fraction {raw}"))?,
        None => DEFAULT_TEST_FRACTION,
    };
    check_fraction(test_fraction).context("--test-fraction")?;

    let mut config = IngestConfig::from_env();
    if args.iter().any(|arg| arg == "--no-cache") {
        config.use_cache = false;
    }

    let store = GameStore::from_config(&config);
    let games = store.list_games(query).context("list games")?;
    let results = store.load_games(&games);

    let mut loaded = 0usize;
    let mut tracked = 0usize;
    let mut goals = 0u32;
    let mut errors = Vec::new();
    for (game, result) in games.iter().zip(results) {
        match result {
            Ok(record) => {
                loaded += 1;
                goals += record.away_score() + record.home_score();
                if game.is_tracked() {
                    tracked += 1;
                }
            }
            Err(err) => errors.push(format!("{game}: {err}")),
        }
    }

    println!("Ingest complete");
    if config.use_cache {
        println!("Cache: {}", config.data_dir.display());
    } else {
        println!("Cache: disabled");
    }
    println!("Games: {}/{} loaded ({} tracked)", loaded, games.len(), tracked);
    println!("Goals: {goals}");

    if let GameQuery::Season(season) = query {
        let split = split_games(games, test_fraction).context("split season")?;
        println!(
            "Season {}: train={} test={}",
            season.year,
            split.train.len(),
            split.test.len()
        );
    }

    if !errors.is_empty() {
        println!("  errors: {}", errors.len());
        for err in errors.iter().take(6) {
            println!("   - {err}");
        }
    }

    Ok(())
}

fn parse_query_arg(args: &[String]) -> Result<GameQuery> {
    if let Some(raw) = arg_value(args, "--date") {
        let date = raw
            .parse::<u32>()
            .with_context(|| format!("invalid --date {raw}, expected YYYYMMDD"))?;
        return Ok(GameQuery::Date(date));
    }
    if let Some(raw) = arg_value(args, "--season") {
        let year = raw
            .parse::<i32>()
            .with_context(|| format!("invalid --season {raw}"))?;
        return Ok(GameQuery::Season(Season::new(year)));
    }
    Err(anyhow!("pass --date=YYYYMMDD or --season=YYYY"))
}

fn arg_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim());
        }
    }
    None
}
