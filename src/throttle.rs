// Copyright (c) 2026 rezky_nightky

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

pub const ENV_KV_URL: &str = "KV_REST_API_URL";
pub const ENV_KV_TOKEN: &str = "KV_REST_API_TOKEN";

const STORE_TIMEOUT: Duration = Duration::from_millis(500);
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Which counter answered a check. Observability only; the admit/reject
/// contract is identical on both paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Durable,
    Local,
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimit {
    pub admitted: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_ms: u64,
    pub source: Source,
}

#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("durable store http error ({status:?}): {message}")]
    Http {
        status: Option<u16>,
        message: String,
    },
    #[error("malformed durable store reply: {0}")]
    Malformed(String),
}

/// What the durable store reports after one atomic bump: the window
/// count after this call, and the remaining window ttl if it has one.
#[derive(Clone, Copy, Debug)]
pub struct DurableReply {
    pub count: u64,
    pub ttl: Option<Duration>,
}

/// Shared counter keyed by caller identifier. The increment and expiry
/// must be applied atomically per key so concurrent checks for the same
/// identifier serialize on the store.
pub trait DurableCounter: Send + Sync {
    fn bump(&self, key: &str, window: Duration) -> Result<DurableReply, ThrottleError>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Redis-over-REST counter (Upstash/Vercel KV wire shape): a single
/// pipelined `INCR` + `PEXPIRE NX` + `PTTL` exchange per check, so the
/// read-back never races a concurrent increment.
pub struct RestCounter {
    base_url: String,
    token: String,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Deserialize)]
struct PipelineItem {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl RestCounter {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ThrottleError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(STORE_TIMEOUT)
            .timeout(STORE_TIMEOUT)
            .build()
            .map_err(|error| ThrottleError::Http {
                status: None,
                message: error.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    /// Reads `KV_REST_API_URL` / `KV_REST_API_TOKEN`. Returns `None`
    /// when either is missing or empty.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var(ENV_KV_URL).ok()?;
        let token = std::env::var(ENV_KV_TOKEN).ok()?;
        Self::from_credentials(&url, &token)
    }

    fn from_credentials(url: &str, token: &str) -> Option<Self> {
        if url.trim().is_empty() || token.trim().is_empty() {
            return None;
        }
        match Self::new(url, token) {
            Ok(counter) => Some(counter),
            Err(error) => {
                warn!(%error, "durable store client construction failed");
                None
            }
        }
    }

    fn item_int(items: &[PipelineItem], idx: usize) -> Result<i64, ThrottleError> {
        let item = items
            .get(idx)
            .ok_or_else(|| ThrottleError::Malformed(format!("missing pipeline result {idx}")))?;
        if let Some(err) = &item.error {
            return Err(ThrottleError::Malformed(format!(
                "command {idx} failed: {err}"
            )));
        }
        match &item.result {
            Some(serde_json::Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| ThrottleError::Malformed(format!("non-integer result {idx}"))),
            // PEXPIRE NX replies 0/1; some deployments stringify numbers.
            Some(serde_json::Value::String(s)) => s
                .parse::<i64>()
                .map_err(|_| ThrottleError::Malformed(format!("non-integer result {idx}"))),
            other => Err(ThrottleError::Malformed(format!(
                "unexpected result {idx}: {other:?}"
            ))),
        }
    }

    /// Interprets the three pipeline results. A failed `PEXPIRE` means
    /// the key was created with no TTL and would reject forever, so it
    /// counts as a store failure and the caller falls back locally.
    fn reply_from_items(items: &[PipelineItem]) -> Result<DurableReply, ThrottleError> {
        let count = Self::item_int(items, 0)?;
        let count = u64::try_from(count)
            .map_err(|_| ThrottleError::Malformed(format!("negative count: {count}")))?;
        Self::item_int(items, 1)?;
        let pttl = Self::item_int(items, 2)?;
        let ttl = if pttl > 0 {
            Some(Duration::from_millis(pttl as u64))
        } else {
            None
        };
        Ok(DurableReply { count, ttl })
    }
}

impl DurableCounter for RestCounter {
    fn bump(&self, key: &str, window: Duration) -> Result<DurableReply, ThrottleError> {
        let window_ms = window.as_millis().min(u64::MAX as u128) as u64;
        let body = serde_json::json!([
            ["INCR", key],
            ["PEXPIRE", key, window_ms, "NX"],
            ["PTTL", key],
        ]);

        let response = self
            .client
            .post(format!("{}/pipeline", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .map_err(|error| ThrottleError::Http {
                status: None,
                message: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "unable to read store reply".to_string());
            return Err(ThrottleError::Http {
                status: Some(status.as_u16()),
                message,
            });
        }

        let items: Vec<PipelineItem> = response
            .json()
            .map_err(|error| ThrottleError::Malformed(error.to_string()))?;
        Self::reply_from_items(&items)
    }

    fn name(&self) -> &'static str {
        "kv-rest"
    }
}

struct LocalEntry {
    count: u32,
    expires_at: Instant,
}

struct LocalState {
    entries: HashMap<String, LocalEntry>,
    last_sweep: Instant,
}

/// In-process fixed-window counter. Expiry is lazy: an entry past its
/// window reads as fresh on the next check. The sweep only bounds
/// memory, it never changes a decision.
pub struct LocalCounter {
    state: Mutex<LocalState>,
}

impl Default for LocalCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCounter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LocalState {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Count after this call and time left in the window.
    pub fn bump_at(&self, now: Instant, key: &str, window: Duration) -> (u32, Duration) {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if now.saturating_duration_since(st.last_sweep) >= SWEEP_INTERVAL {
            st.entries.retain(|_, e| e.expires_at > now);
            st.last_sweep = now;
        }

        let entry = st
            .entries
            .entry(key.to_string())
            .and_modify(|e| {
                if e.expires_at <= now {
                    e.count = 1;
                    e.expires_at = now + window;
                } else {
                    e.count = e.count.saturating_add(1);
                }
            })
            .or_insert(LocalEntry {
                count: 1,
                expires_at: now + window,
            });

        (entry.count, entry.expires_at.saturating_duration_since(now))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .min(u64::MAX as u128) as u64
}

fn decision(count: u64, limit: u32, reset_in: Duration, source: Source) -> RateLimit {
    let admitted = count <= limit as u64;
    let remaining = (limit as u64).saturating_sub(count).min(u32::MAX as u64) as u32;
    RateLimit {
        admitted,
        limit,
        remaining,
        reset_at_ms: unix_now_ms().saturating_add(
            reset_in.as_millis().min(u64::MAX as u128) as u64,
        ),
        source,
    }
}

/// Fixed-window request throttle: durable shared counter when
/// configured and reachable, in-process fallback otherwise. `check`
/// never fails; degraded paths are logged once per condition and
/// answered locally.
pub struct Throttle {
    durable: Option<Box<dyn DurableCounter>>,
    local: LocalCounter,
    http_warned: AtomicBool,
    malformed_warned: AtomicBool,
}

impl Throttle {
    /// Builds from `KV_REST_API_*` environment configuration, warning
    /// once when the durable store is unconfigured.
    pub fn from_env() -> Self {
        match RestCounter::from_env() {
            Some(counter) => Self::with_counter(Box::new(counter)),
            None => {
                warn!(
                    "durable store not configured ({} / {}), using in-process counter",
                    ENV_KV_URL, ENV_KV_TOKEN
                );
                Self::local_only()
            }
        }
    }

    pub fn with_counter(counter: Box<dyn DurableCounter>) -> Self {
        Self {
            durable: Some(counter),
            local: LocalCounter::new(),
            http_warned: AtomicBool::new(false),
            malformed_warned: AtomicBool::new(false),
        }
    }

    pub fn local_only() -> Self {
        Self {
            durable: None,
            local: LocalCounter::new(),
            http_warned: AtomicBool::new(false),
            malformed_warned: AtomicBool::new(false),
        }
    }

    fn warn_once(&self, counter: &dyn DurableCounter, error: &ThrottleError) {
        let flag = match error {
            ThrottleError::Http { .. } => &self.http_warned,
            ThrottleError::Malformed(_) => &self.malformed_warned,
        };
        if !flag.swap(true, Ordering::Relaxed) {
            warn!(counter = counter.name(), %error, "durable store unavailable, falling back to in-process counter");
        }
    }

    /// Admit/reject decision for one action by `identifier` under
    /// `limit` actions per `window`. The boundary is inclusive: the call
    /// that reaches `count == limit` is admitted.
    pub fn check(&self, identifier: &str, limit: u32, window: Duration) -> RateLimit {
        if let Some(counter) = &self.durable {
            match counter.bump(identifier, window) {
                Ok(reply) => {
                    let reset_in = reply.ttl.unwrap_or(window);
                    return decision(reply.count, limit, reset_in, Source::Durable);
                }
                Err(error) => self.warn_once(counter.as_ref(), &error),
            }
        }

        let (count, reset_in) = self.local.bump_at(Instant::now(), identifier, window);
        decision(count as u64, limit, reset_in, Source::Local)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use super::*;

    const WINDOW: Duration = Duration::from_millis(900_000);

    struct MockCounter {
        hits: AtomicU64,
    }

    impl MockCounter {
        fn new() -> Self {
            Self {
                hits: AtomicU64::new(0),
            }
        }
    }

    impl DurableCounter for MockCounter {
        fn bump(&self, _key: &str, window: Duration) -> Result<DurableReply, ThrottleError> {
            let count = self.hits.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(DurableReply {
                count,
                ttl: Some(window / 2),
            })
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    struct BrokenCounter;

    impl DurableCounter for BrokenCounter {
        fn bump(&self, _key: &str, _window: Duration) -> Result<DurableReply, ThrottleError> {
            Err(ThrottleError::Http {
                status: None,
                message: "connection refused".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[test]
    fn four_calls_at_limit_three_reject_the_fourth() {
        let throttle = Throttle::local_only();
        let mut admitted = Vec::new();
        let mut remaining = Vec::new();
        for _ in 0..4 {
            let r = throttle.check("ip-1", 3, WINDOW);
            admitted.push(r.admitted);
            remaining.push(r.remaining);
            assert_eq!(r.source, Source::Local);
            assert_eq!(r.limit, 3);
        }
        assert_eq!(admitted, vec![true, true, true, false]);
        assert_eq!(remaining, vec![2, 1, 0, 0]);
    }

    #[test]
    fn boundary_count_equal_to_limit_is_admitted() {
        let local = LocalCounter::new();
        let t0 = Instant::now();
        let limit = 2u32;
        let (c1, _) = local.bump_at(t0, "k", WINDOW);
        let (c2, _) = local.bump_at(t0, "k", WINDOW);
        let (c3, _) = local.bump_at(t0, "k", WINDOW);
        assert_eq!((c1, c2, c3), (1, 2, 3));
        assert!(c2 <= limit); // count == limit admits
        assert!(c3 > limit); // the next call rejects
    }

    #[test]
    fn window_reset_starts_a_fresh_count() {
        let local = LocalCounter::new();
        let t0 = Instant::now();
        for _ in 0..5 {
            local.bump_at(t0, "k", WINDOW);
        }
        let (count, reset_in) = local.bump_at(t0 + WINDOW + Duration::from_millis(1), "k", WINDOW);
        assert_eq!(count, 1);
        assert_eq!(reset_in, WINDOW);
    }

    #[test]
    fn remaining_never_increases_within_a_window() {
        let throttle = Throttle::local_only();
        let mut prev = u32::MAX;
        for _ in 0..6 {
            let r = throttle.check("ip-2", 4, WINDOW);
            assert!(r.remaining <= prev);
            prev = r.remaining;
        }
    }

    #[test]
    fn distinct_identifiers_do_not_interfere() {
        let throttle = Throttle::local_only();
        for _ in 0..3 {
            throttle.check("ip-a", 3, WINDOW);
        }
        let r = throttle.check("ip-b", 3, WINDOW);
        assert!(r.admitted);
        assert_eq!(r.remaining, 2);
    }

    #[test]
    fn durable_counter_answers_when_healthy() {
        let throttle = Throttle::with_counter(Box::new(MockCounter::new()));
        let r1 = throttle.check("ip-1", 2, WINDOW);
        let r2 = throttle.check("ip-1", 2, WINDOW);
        let r3 = throttle.check("ip-1", 2, WINDOW);
        assert_eq!(r1.source, Source::Durable);
        assert!(r1.admitted && r2.admitted);
        assert!(!r3.admitted);
        assert_eq!([r1.remaining, r2.remaining, r3.remaining], [1, 0, 0]);
    }

    #[test]
    fn broken_durable_store_falls_back_to_local() {
        let throttle = Throttle::with_counter(Box::new(BrokenCounter));
        let mut admitted = Vec::new();
        for _ in 0..4 {
            let r = throttle.check("ip-1", 3, WINDOW);
            assert_eq!(r.source, Source::Local);
            admitted.push(r.admitted);
        }
        assert_eq!(admitted, vec![true, true, true, false]);
    }

    #[test]
    fn sweep_drops_expired_entries() {
        let local = LocalCounter::new();
        let t0 = Instant::now();
        let short = Duration::from_millis(10);
        local.bump_at(t0, "old", short);
        local.bump_at(t0, "live", Duration::from_secs(3600));
        assert_eq!(local.len(), 2);
        // Past the sweep interval the expired entry is reclaimed.
        local.bump_at(t0 + SWEEP_INTERVAL + short, "live", Duration::from_secs(3600));
        assert_eq!(local.len(), 1);
    }

    fn pipeline(json: &str) -> Vec<PipelineItem> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn pipeline_reply_parses_count_and_ttl() {
        let items = pipeline(r#"[{"result":2},{"result":1},{"result":885000}]"#);
        let reply = RestCounter::reply_from_items(&items).unwrap();
        assert_eq!(reply.count, 2);
        assert_eq!(reply.ttl, Some(Duration::from_millis(885_000)));
    }

    #[test]
    fn failed_expiry_command_is_a_store_failure() {
        // A key bumped without a TTL would reject forever while
        // reporting a reset time that never arrives.
        let items = pipeline(r#"[{"result":4},{"error":"ERR unknown command"},{"result":-1}]"#);
        assert!(matches!(
            RestCounter::reply_from_items(&items),
            Err(ThrottleError::Malformed(_))
        ));
    }

    #[test]
    fn blank_credentials_yield_no_counter() {
        assert!(RestCounter::from_credentials("", "token").is_none());
        assert!(RestCounter::from_credentials("https://kv.example.com", " ").is_none());
        assert!(RestCounter::from_credentials("https://kv.example.com", "token").is_some());
    }

    #[test]
    fn reset_time_is_in_the_future() {
        let throttle = Throttle::local_only();
        let before = unix_now_ms();
        let r = throttle.check("ip-3", 3, WINDOW);
        assert!(r.reset_at_ms >= before + WINDOW.as_millis() as u64 - 50);
    }
}
