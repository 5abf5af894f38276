use std::ops::{Deref, DerefMut};
use std::thread;
use std::time::Duration;

use fantoccini::{Client as WebDriver, ClientBuilder};
use once_cell::sync::OnceCell;
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use serde_json::json;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result, SessionError};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const BROWSER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Default address of a locally running geckodriver.
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";

/// A page session: navigate somewhere, then read the document.
pub trait PageSession: Send {
    fn navigate(&mut self, url: &str) -> std::result::Result<(), SessionError>;
    fn page_source(&mut self) -> std::result::Result<String, SessionError>;
    /// Releases whatever the session holds. Must be safe to call twice.
    fn close(&mut self);

    /// Whether scripts keep changing the document after `navigate` returns.
    /// Only such sessions wait out the settle delay.
    fn renders_scripts(&self) -> bool {
        true
    }
}

struct Driver {
    runtime: Runtime,
    client: WebDriver,
}

/// Headless Firefox driven over WebDriver (geckodriver).
///
/// Nothing is started until the first `navigate`. The browser is reused for
/// later navigations and shut down by `close`.
pub struct BrowserSession {
    webdriver_url: String,
    driver: Option<Driver>,
    loaded: bool,
}

impl BrowserSession {
    pub fn new(webdriver_url: impl Into<String>) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            driver: None,
            loaded: false,
        }
    }

    fn driver(&mut self) -> std::result::Result<&Driver, SessionError> {
        if self.driver.is_none() {
            self.driver = Some(self.start()?);
        }
        self.driver
            .as_ref()
            .ok_or_else(|| SessionError::Setup("browser did not start".to_string()))
    }

    fn start(&self) -> std::result::Result<Driver, SessionError> {
        debug!(webdriver = %self.webdriver_url, "initializing browser session");
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| SessionError::Setup(err.to_string()))?;

        let mut capabilities = serde_json::Map::new();
        capabilities.insert(
            "moz:firefoxOptions".to_string(),
            json!({ "args": ["-headless"] }),
        );
        let mut builder = ClientBuilder::native();
        builder.capabilities(capabilities);
        let client = runtime
            .block_on(builder.connect(&self.webdriver_url))
            .map_err(|err| SessionError::Setup(err.to_string()))?;
        Ok(Driver { runtime, client })
    }
}

impl PageSession for BrowserSession {
    fn navigate(&mut self, url: &str) -> std::result::Result<(), SessionError> {
        self.loaded = false;
        let driver = self.driver()?;
        driver
            .runtime
            .block_on(driver.client.goto(url))
            .map_err(|err| SessionError::Driver(err.to_string()))?;
        self.loaded = true;
        Ok(())
    }

    fn page_source(&mut self) -> std::result::Result<String, SessionError> {
        let Some(driver) = self.driver.as_ref().filter(|_| self.loaded) else {
            return Err(SessionError::NothingLoaded);
        };
        driver
            .runtime
            .block_on(driver.client.source())
            .map_err(|err| SessionError::Driver(err.to_string()))
    }

    fn close(&mut self) {
        self.loaded = false;
        let Some(Driver { runtime, client }) = self.driver.take() else {
            return;
        };
        match runtime.block_on(client.close()) {
            Ok(()) => debug!("closed browser session"),
            Err(err) => warn!(error = %err, "browser session did not close cleanly"),
        }
    }
}

/// Plain HTTP GET with a lazily built client. No scripts run, so this only
/// suits pages that are served complete.
pub struct HttpSession {
    client: OnceCell<Client>,
    page: Option<String>,
}

impl Default for HttpSession {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpSession {
    pub fn new() -> Self {
        Self {
            client: OnceCell::new(),
            page: None,
        }
    }

    fn client(&self) -> std::result::Result<&Client, SessionError> {
        self.client.get_or_try_init(|| {
            debug!("initializing http session");
            Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .map_err(|err| SessionError::Setup(err.to_string()))
        })
    }
}

impl PageSession for HttpSession {
    fn navigate(&mut self, url: &str) -> std::result::Result<(), SessionError> {
        self.page = None;
        let resp = self.client()?.get(url).header(USER_AGENT, BROWSER_AGENT).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SessionError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        self.page = Some(resp.text()?);
        Ok(())
    }

    fn page_source(&mut self) -> std::result::Result<String, SessionError> {
        self.page.clone().ok_or(SessionError::NothingLoaded)
    }

    fn close(&mut self) {
        self.page = None;
        if self.client.take().is_some() {
            debug!("closed http session");
        }
    }

    fn renders_scripts(&self) -> bool {
        false
    }
}

/// Owns a session for one fetch and closes it on every exit path.
pub struct SessionScope {
    session: Box<dyn PageSession>,
}

impl SessionScope {
    pub fn new(session: Box<dyn PageSession>) -> Self {
        Self { session }
    }
}

impl Deref for SessionScope {
    type Target = dyn PageSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for SessionScope {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for SessionScope {
    fn drop(&mut self) {
        self.session.close();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    /// Wait between navigating and reading the document so client-side
    /// scripts can fill it in. Skipped for sessions that run no scripts.
    pub settle_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_millis(400),
            settle_delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// No waiting at all; for tests and local fixtures.
    pub fn immediate() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            settle_delay: Duration::ZERO,
        }
    }

    pub fn backoff(&self) -> Duration {
        let min = self.min_backoff.as_millis() as u64;
        let max = self.max_backoff.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Anything that can turn a URL into a page body.
pub trait PageFetcher: Send + Sync {
    fn fetch_page(&self, url: &str) -> Result<String>;
}

type SessionFactory = dyn Fn() -> Box<dyn PageSession> + Send + Sync;

/// Retrying fetcher. Each `fetch_page` call opens its own session, reuses it
/// across retries, and closes it before returning.
pub struct Fetcher {
    policy: RetryPolicy,
    open_session: Box<SessionFactory>,
}

impl Fetcher {
    /// Renders every page in headless Firefox behind `webdriver_url`.
    pub fn browser(policy: RetryPolicy, webdriver_url: impl Into<String>) -> Self {
        let webdriver_url = webdriver_url.into();
        Self::with_sessions(policy, move || {
            Box::new(BrowserSession::new(webdriver_url.clone()))
        })
    }

    pub fn http(policy: RetryPolicy) -> Self {
        Self::with_sessions(policy, || Box::new(HttpSession::new()))
    }

    pub fn with_sessions(
        policy: RetryPolicy,
        open_session: impl Fn() -> Box<dyn PageSession> + Send + Sync + 'static,
    ) -> Self {
        Self {
            policy,
            open_session: Box::new(open_session),
        }
    }

    fn attempt(
        &self,
        session: &mut dyn PageSession,
        url: &str,
    ) -> std::result::Result<String, SessionError> {
        session.navigate(url)?;
        if session.renders_scripts() && !self.policy.settle_delay.is_zero() {
            thread::sleep(self.policy.settle_delay);
        }
        session.page_source()
    }
}

impl PageFetcher for Fetcher {
    fn fetch_page(&self, url: &str) -> Result<String> {
        info!(url, "reading url");
        let max_attempts = self.policy.max_attempts.max(1);
        let mut session = SessionScope::new((self.open_session)());

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.attempt(&mut *session, url) {
                Ok(body) => {
                    info!(url, attempts, "finished pulling url");
                    return Ok(body);
                }
                Err(err) if attempts < max_attempts => {
                    let wait = self.policy.backoff();
                    warn!(url, attempts, error = %err, "fetch failed, retrying in {wait:?}");
                    thread::sleep(wait);
                }
                Err(err) => {
                    return Err(IngestError::FetchExhausted {
                        url: url.to_string(),
                        attempts,
                        source: err,
                    });
                }
            }
        }
    }
}
