use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{document_ready, extract_record, ExtractError};
use crate::record::ProfileRecord;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_POLL_ATTEMPTS: u32 = 10;
pub const INCOMPLETE_RETRIES: u32 = 1;
pub const TRIGGER_LIMIT: usize = 5;
pub const TRIGGER_WINDOW: Duration = Duration::from_secs(60);

const USER_AGENT: &str = "Mozilla/5.0 (compatible; profile-sync/0.1)";

/// Where documents come from. Real sources hit the disk or the network;
/// tests script a sequence of pages.
#[allow(async_fn_in_trait)]
pub trait DocumentSource {
    async fn fetch(&self) -> Result<String, ExtractError>;

    /// Address of the document, used when the page has no canonical link.
    fn url(&self) -> Option<&str> {
        None
    }
}

/// Time injection point so polling and deferral run without real sleeps
/// under test.
#[allow(async_fn_in_trait)]
pub trait Clock {
    fn now(&self) -> Instant;
    async fn sleep(&self, d: Duration);
}

pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentSource for FileSource {
    async fn fetch(&self) -> Result<String, ExtractError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ExtractError::Source(format!("{}: {e}", self.path.display())))
    }
}

pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl DocumentSource for HttpSource {
    async fn fetch(&self) -> Result<String, ExtractError> {
        let resp = self
            .client
            .get(&self.url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| ExtractError::Source(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ExtractError::Source(format!(
                "{} returned {}",
                self.url,
                resp.status()
            )));
        }
        resp.text()
            .await
            .map_err(|e| ExtractError::Source(e.to_string()))
    }

    fn url(&self) -> Option<&str> {
        Some(&self.url)
    }
}

/// Sliding-window limiter over trigger timestamps. `acquire` records the
/// hit when admitted; when the window is full it returns how long until
/// the oldest hit ages out.
pub struct RateLimiter {
    window: Duration,
    limit: usize,
    hits: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            window,
            limit,
            hits: Mutex::new(VecDeque::new()),
        }
    }

    pub fn acquire(&self, now: Instant) -> Option<Duration> {
        let mut hits = self.hits.lock().unwrap_or_else(|p| p.into_inner());
        while hits
            .front()
            .is_some_and(|&t| now.duration_since(t) >= self.window)
        {
            hits.pop_front();
        }
        if hits.len() < self.limit {
            hits.push_back(now);
            return None;
        }
        match hits.front() {
            Some(&oldest) => Some(self.window.saturating_sub(now.duration_since(oldest))),
            None => {
                hits.push_back(now);
                None
            }
        }
    }
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Record(ProfileRecord),
    /// A run was already in flight; this request was dropped, not queued.
    AlreadyRunning,
}

enum Phase {
    Waiting { attempt: u32, retries_left: u32 },
    Extracting { html: String, retries_left: u32 },
}

/// Drives one extraction end to end: wait for the document to settle,
/// extract, retry once if the result is unusable. At most one run is in
/// flight at a time and triggers are rate limited per sliding window.
pub struct Orchestrator<S, C> {
    source: S,
    clock: C,
    limiter: RateLimiter,
    in_flight: AtomicBool,
}

impl<S: DocumentSource, C: Clock> Orchestrator<S, C> {
    pub fn new(source: S, clock: C) -> Self {
        Self {
            source,
            clock,
            limiter: RateLimiter::new(TRIGGER_LIMIT, TRIGGER_WINDOW),
            in_flight: AtomicBool::new(false),
        }
    }

    pub async fn trigger(&self) -> Result<TriggerOutcome, ExtractError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("extraction already in flight, dropping trigger");
            return Ok(TriggerOutcome::AlreadyRunning);
        }
        let _guard = FlightGuard(&self.in_flight);

        while let Some(wait) = self.limiter.acquire(self.clock.now()) {
            info!(defer_ms = wait.as_millis() as u64, "trigger rate limited, deferring");
            self.clock.sleep(wait).await;
        }

        let record = self.run().await?;
        Ok(TriggerOutcome::Record(record))
    }

    async fn run(&self) -> Result<ProfileRecord, ExtractError> {
        let mut phase = Phase::Waiting {
            attempt: 0,
            retries_left: INCOMPLETE_RETRIES,
        };
        loop {
            phase = match phase {
                Phase::Waiting { attempt, retries_left } => {
                    let html = self.source.fetch().await?;
                    if document_ready(&html) {
                        Phase::Extracting { html, retries_left }
                    } else if attempt + 1 >= MAX_POLL_ATTEMPTS {
                        warn!(
                            attempts = MAX_POLL_ATTEMPTS,
                            "page never settled, extracting anyway"
                        );
                        Phase::Extracting { html, retries_left }
                    } else {
                        self.clock.sleep(POLL_INTERVAL).await;
                        Phase::Waiting {
                            attempt: attempt + 1,
                            retries_left,
                        }
                    }
                }
                Phase::Extracting { html, retries_left } => {
                    let record = extract_record(&html, self.source.url());
                    if record.is_complete() {
                        return Ok(record);
                    }
                    if retries_left == 0 {
                        return Err(ExtractError::Incomplete);
                    }
                    info!("extraction incomplete, retrying once more");
                    self.clock.sleep(POLL_INTERVAL).await;
                    Phase::Waiting {
                        attempt: 0,
                        retries_left: retries_left - 1,
                    }
                }
            };
        }
    }
}

struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::sync::Notify;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{name}")).unwrap()
    }

    /// Serves the scripted pages in order, repeating the final one.
    struct ScriptedSource {
        pages: Mutex<VecDeque<String>>,
        fetches: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(pages: Vec<String>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                fetches: AtomicUsize::new(0),
            }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl DocumentSource for ScriptedSource {
        async fn fetch(&self) -> Result<String, ExtractError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut pages = self.pages.lock().unwrap();
            if pages.len() > 1 {
                Ok(pages.pop_front().unwrap())
            } else {
                Ok(pages.front().cloned().unwrap_or_default())
            }
        }
    }

    struct FakeClock {
        now: Mutex<Instant>,
        slept: Mutex<Vec<Duration>>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
                slept: Mutex::new(Vec::new()),
            }
        }

        fn total_slept(&self) -> Duration {
            self.slept.lock().unwrap().iter().sum()
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }

        async fn sleep(&self, d: Duration) {
            *self.now.lock().unwrap() += d;
            self.slept.lock().unwrap().push(d);
        }
    }

    #[tokio::test]
    async fn polls_until_document_ready() {
        let skeleton = fixture("profile_skeleton.html");
        let full = fixture("profile_full.html");
        let source = ScriptedSource::new(vec![skeleton.clone(), skeleton.clone(), skeleton, full]);
        let orch = Orchestrator::new(source, FakeClock::new());

        let outcome = orch.trigger().await.unwrap();
        let TriggerOutcome::Record(record) = outcome else {
            panic!("expected a record");
        };
        assert_eq!(record.full_name, "Jane Doe");
        assert_eq!(orch.source.fetch_count(), 4);
        assert_eq!(orch.clock.total_slept(), POLL_INTERVAL * 3);
    }

    #[tokio::test]
    async fn incomplete_page_retries_once_then_errors() {
        let source = ScriptedSource::new(vec![fixture("profile_skeleton.html")]);
        let orch = Orchestrator::new(source, FakeClock::new());

        let err = orch.trigger().await.unwrap_err();
        assert!(matches!(err, ExtractError::Incomplete));
        // two full poll rounds: the initial pass plus the single retry
        assert_eq!(orch.source.fetch_count(), (MAX_POLL_ATTEMPTS * 2) as usize);
    }

    #[tokio::test]
    async fn guard_releases_after_failure() {
        let source = ScriptedSource::new(vec![fixture("profile_skeleton.html")]);
        let orch = Orchestrator::new(source, FakeClock::new());

        assert!(orch.trigger().await.is_err());
        // a fresh trigger runs again instead of reporting a duplicate
        let err = orch.trigger().await.unwrap_err();
        assert!(matches!(err, ExtractError::Incomplete));
    }

    struct GatedSource {
        gate: Arc<Notify>,
        page: String,
    }

    impl DocumentSource for GatedSource {
        async fn fetch(&self) -> Result<String, ExtractError> {
            self.gate.notified().await;
            Ok(self.page.clone())
        }
    }

    #[tokio::test]
    async fn concurrent_trigger_is_dropped() {
        let gate = Arc::new(Notify::new());
        let source = GatedSource {
            gate: gate.clone(),
            page: fixture("profile_full.html"),
        };
        let orch = Arc::new(Orchestrator::new(source, TokioClock));

        let background = tokio::spawn({
            let orch = orch.clone();
            async move { orch.trigger().await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let second = orch.trigger().await.unwrap();
        assert!(matches!(second, TriggerOutcome::AlreadyRunning));

        gate.notify_one();
        let first = background.await.unwrap().unwrap();
        assert!(matches!(first, TriggerOutcome::Record(_)));
    }

    struct FailingSource;

    impl DocumentSource for FailingSource {
        async fn fetch(&self) -> Result<String, ExtractError> {
            Err(ExtractError::Source("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn source_error_surfaces_and_releases_the_guard() {
        let orch = Orchestrator::new(FailingSource, TokioClock);
        assert!(matches!(orch.trigger().await, Err(ExtractError::Source(_))));
        assert!(matches!(orch.trigger().await, Err(ExtractError::Source(_))));
    }

    #[test]
    fn limiter_admits_up_to_limit_within_window() {
        let limiter = RateLimiter::new(TRIGGER_LIMIT, TRIGGER_WINDOW);
        let t0 = Instant::now();
        for _ in 0..TRIGGER_LIMIT {
            assert_eq!(limiter.acquire(t0), None);
        }
        let wait = limiter.acquire(t0 + Duration::from_secs(10)).unwrap();
        assert_eq!(wait, Duration::from_secs(50));
        // a slot frees once the oldest hit ages out
        assert_eq!(limiter.acquire(t0 + TRIGGER_WINDOW), None);
    }

    #[tokio::test]
    async fn trigger_past_the_window_defers_then_runs() {
        let source = ScriptedSource::new(vec![fixture("profile_full.html")]);
        let orch = Orchestrator::new(source, FakeClock::new());

        for _ in 0..TRIGGER_LIMIT {
            assert!(matches!(
                orch.trigger().await.unwrap(),
                TriggerOutcome::Record(_)
            ));
        }
        let outcome = orch.trigger().await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Record(_)));
        assert!(orch.clock.total_slept() >= TRIGGER_WINDOW);
    }
}
