use crate::constants::limits::RATE_LIMIT_SWEEP_THRESHOLD;
use crate::errors::RelayError;
use crate::models::{ApiDefinition, RateLimit};
use crate::services::logger::Logger;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Bucket {
    window: Duration,
    hits: VecDeque<Instant>,
}

impl Bucket {
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.hits.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Debug, Default)]
struct Windows {
    per_user: HashMap<(String, String), Bucket>,
    global: HashMap<String, Bucket>,
}

fn check_bucket<K: Eq + Hash>(
    buckets: &mut HashMap<K, Bucket>,
    key: K,
    limit: RateLimit,
    now: Instant,
) -> bool {
    let bucket = buckets.entry(key).or_insert_with(|| Bucket {
        window: limit.window,
        hits: VecDeque::new(),
    });
    bucket.window = limit.window;
    bucket.prune(now);
    if bucket.hits.len() as u64 >= limit.max {
        return false;
    }
    bucket.hits.push_back(now);
    true
}

fn sweep<K>(buckets: &mut HashMap<K, Bucket>, now: Instant) {
    if buckets.len() < RATE_LIMIT_SWEEP_THRESHOLD {
        return;
    }
    buckets.retain(|_, bucket| {
        bucket.prune(now);
        !bucket.hits.is_empty()
    });
}

/// In-memory sliding-window counters, per (user, API) and per API.
/// State lives for the process lifetime and is never persisted.
pub struct RateLimiter {
    logger: Logger,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.child("rate_limit"),
            windows: Mutex::new(Windows::default()),
        }
    }

    pub fn check_and_record(
        &self,
        api: &ApiDefinition,
        user_id: Option<&str>,
        api_key: &str,
    ) -> Result<(), RelayError> {
        self.check_and_record_at(api, user_id, api_key, Instant::now())
    }

    pub fn check_and_record_global(
        &self,
        api: &ApiDefinition,
        api_key: &str,
    ) -> Result<(), RelayError> {
        self.check_and_record_global_at(api, api_key, Instant::now())
    }

    pub fn check_and_record_at(
        &self,
        api: &ApiDefinition,
        user_id: Option<&str>,
        api_key: &str,
        now: Instant,
    ) -> Result<(), RelayError> {
        let Some(limit) = api.rate_limit else {
            return Ok(());
        };
        let key = (user_id.unwrap_or("").to_string(), api_key.to_string());
        let allowed = {
            let mut guard = self.windows.lock().unwrap_or_else(|err| err.into_inner());
            sweep(&mut guard.per_user, now);
            check_bucket(&mut guard.per_user, key, limit, now)
        };
        if allowed {
            return Ok(());
        }
        self.logger.debug(
            "Per-user rate limit hit",
            Some(&serde_json::json!({"api_key": api_key, "user_id": user_id.unwrap_or("")})),
        );
        Err(RelayError::rate_limited(
            "You are calling this API too often, please try again later.",
        ))
    }

    pub fn check_and_record_global_at(
        &self,
        api: &ApiDefinition,
        api_key: &str,
        now: Instant,
    ) -> Result<(), RelayError> {
        let Some(limit) = api.rate_limit_global else {
            return Ok(());
        };
        let allowed = {
            let mut guard = self.windows.lock().unwrap_or_else(|err| err.into_inner());
            sweep(&mut guard.global, now);
            check_bucket(&mut guard.global, api_key.to_string(), limit, now)
        };
        if allowed {
            return Ok(());
        }
        self.logger.debug(
            "Global rate limit hit",
            Some(&serde_json::json!({"api_key": api_key})),
        );
        Err(RelayError::rate_limited(
            "This API is being called too often, please try again later.",
        ))
    }

    /// Number of live buckets, per-user and global.
    pub fn bucket_counts(&self) -> (usize, usize) {
        let guard = self.windows.lock().unwrap_or_else(|err| err.into_inner());
        (guard.per_user.len(), guard.global.len())
    }
}
