use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, FileCache, NoCache};
use crate::fetch::{DEFAULT_WEBDRIVER_URL, Fetcher, RetryPolicy};

const APP_DIR: &str = "puckcache";

/// How pages are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionKind {
    /// Headless Firefox over WebDriver; scripts run before the page is read.
    #[default]
    Browser,
    /// Plain HTTP GET; for pages served complete.
    Http,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub data_dir: PathBuf,
    /// `false` swaps in `NoCache`, forcing every page to be fetched again.
    pub use_cache: bool,
    pub fetch_parallelism: usize,
    pub retry: RetryPolicy,
    pub session: SessionKind,
    pub webdriver_url: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(|key| env::var(key).ok()),
            use_cache: true,
            fetch_parallelism: 6,
            retry: RetryPolicy::default(),
            session: SessionKind::default(),
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolves settings through `lookup`, which maps a variable name to its
    /// value if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("PUCKCACHE_DATA_DIR")
            .filter(|val| !val.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir(&lookup));
        let use_cache = !lookup("PUCKCACHE_NO_CACHE").is_some_and(|val| is_truthy(&val));
        let fetch_parallelism = lookup("FETCH_PARALLELISM")
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(6)
            .clamp(1, 32);

        let mut retry = RetryPolicy::default();
        if let Some(ms) = lookup("FETCH_SETTLE_MS").and_then(|val| val.parse::<u64>().ok()) {
            retry.settle_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = lookup("FETCH_MAX_ATTEMPTS").and_then(|val| val.parse::<u32>().ok())
        {
            retry.max_attempts = attempts.max(1);
        }

        let session = match lookup("FETCH_SESSION").as_deref().map(str::trim) {
            Some(kind) if kind.eq_ignore_ascii_case("http") => SessionKind::Http,
            _ => SessionKind::Browser,
        };
        let webdriver_url = lookup("WEBDRIVER_URL")
            .filter(|val| !val.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string());

        Self {
            data_dir,
            use_cache,
            fetch_parallelism,
            retry,
            session,
            webdriver_url,
        }
    }

    pub fn fetcher(&self) -> Fetcher {
        match self.session {
            SessionKind::Browser => Fetcher::browser(self.retry, self.webdriver_url.clone()),
            SessionKind::Http => Fetcher::http(self.retry),
        }
    }

    pub fn open_cache(&self) -> Arc<dyn Cache> {
        if self.use_cache {
            Arc::new(FileCache::new(&self.data_dir))
        } else {
            Arc::new(NoCache)
        }
    }
}

fn is_truthy(val: &str) -> bool {
    matches!(
        val.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn default_data_dir(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    // Prefer XDG cache, then ~/.cache, then the working directory.
    if let Some(base) = lookup("XDG_CACHE_HOME").filter(|val| !val.trim().is_empty()) {
        return PathBuf::from(base).join(APP_DIR);
    }
    match lookup("HOME").filter(|val| !val.trim().is_empty()) {
        Some(home) => PathBuf::from(home).join(".cache").join(APP_DIR),
        None => PathBuf::from("data"),
    }
}
