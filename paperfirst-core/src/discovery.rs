//! Discovery orchestrator: the retry loop that turns oracle output into
//! graded, cached topics.
//!
//! One discovery run moves through these phases:
//! 1. Fingerprint the category and serve a live cache entry if there is one.
//! 2. Ask the oracle for `target + headroom` candidates.
//! 3. Drop evasive or citation-free candidates, parse the rest.
//! 4. Grade every citation and drop those below the minimum grade. A topic
//!    without a surviving citation is discarded.
//! 5. Accumulate new topics, de-duplicated on their lead citation.
//! 6. Repeat until the target is met or the attempt budget is spent.
//!
//! Only complete results (or accepted partial ones) are cached.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{Fingerprint, RequestKind, ResultCache};
use crate::config::PaperFirstConfig;
use crate::error::{ConfigError, DiscoveryError, OracleError};
use crate::evaluator::QualityEvaluator;
use crate::filter::CandidateFilter;
use crate::oracle::ContentOracle;
use crate::parse::{TopicDraft, parse_candidate};
use crate::types::{DiscoveryResult, GradedCitation, Grade, RawCandidate, Termination, Topic};

/// Discovery loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Oracle calls allowed per discovery run, failed calls included.
    pub max_attempts: usize,
    /// Topics wanted per category.
    pub target_topic_count: usize,
    /// Citations graded below this are dropped.
    pub min_acceptable_grade: Grade,
    /// Cache and return a non-empty result that fell short of the target.
    pub accept_partial: bool,
    /// Extra candidates requested per call on top of the target.
    pub batch_headroom: usize,
    /// Consecutive transport failures that abort the run.
    pub max_consecutive_failures: usize,
    /// First backoff after a failed call. Zero disables waiting.
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            target_topic_count: 5,
            min_acceptable_grade: Grade::B,
            accept_partial: false,
            batch_headroom: 2,
            max_consecutive_failures: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };
        if self.max_attempts == 0 {
            return invalid("discovery.max_attempts must be at least 1");
        }
        if self.target_topic_count == 0 {
            return invalid("discovery.target_topic_count must be at least 1");
        }
        if self.batch_headroom == 0 {
            return invalid("discovery.batch_headroom must be at least 1");
        }
        if self.max_consecutive_failures == 0 {
            return invalid("discovery.max_consecutive_failures must be at least 1");
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return invalid("discovery.backoff_multiplier must be a finite value >= 1.0");
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return invalid("discovery.max_backoff_ms must not be below initial_backoff_ms");
        }
        Ok(())
    }

    /// Wait before the next call after `failures` consecutive failures.
    ///
    /// Exponential in the failure count and capped at `max_backoff_ms`; a
    /// server-suggested `retry_after` raises the wait above the cap.
    pub fn backoff_delay(&self, failures: usize, retry_after_secs: Option<u64>) -> Duration {
        if self.initial_backoff_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = failures.saturating_sub(1).min(63) as i32;
        let base = self.initial_backoff_ms as f64 * self.backoff_multiplier.max(1.0).powi(exponent);
        let capped = base.min(self.max_backoff_ms as f64) as u64;
        let ms = retry_after_secs.map_or(capped, |secs| capped.max(secs.saturating_mul(1000)));
        Duration::from_millis(ms)
    }
}

/// Drives the oracle until enough graded topics are found.
pub struct DiscoveryOrchestrator {
    oracle: Arc<dyn ContentOracle>,
    cache: Arc<ResultCache>,
    filter: CandidateFilter,
    evaluator: QualityEvaluator,
    config: DiscoveryConfig,
    key_locks: LockTable,
}

/// Counters carried through one run.
#[derive(Default)]
struct RunState {
    topics: Vec<Topic>,
    seen: HashSet<String>,
    attempts: usize,
    oracle_calls: usize,
    consecutive_failures: usize,
}

impl RunState {
    fn finish(mut self, target: usize, termination: Termination) -> DiscoveryResult {
        self.topics.truncate(target);
        DiscoveryResult {
            complete: self.topics.len() >= target,
            topics: self.topics,
            termination,
            attempts: self.attempts,
            oracle_calls: self.oracle_calls,
        }
    }
}

impl DiscoveryOrchestrator {
    pub fn new(
        oracle: Arc<dyn ContentOracle>,
        cache: Arc<ResultCache>,
        filter: CandidateFilter,
        evaluator: QualityEvaluator,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            oracle,
            cache,
            filter,
            evaluator,
            config,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Build an orchestrator from a full configuration.
    pub fn from_config(
        oracle: Arc<dyn ContentOracle>,
        cache: Arc<ResultCache>,
        config: &PaperFirstConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            oracle,
            cache,
            CandidateFilter::new(&config.filter)?,
            QualityEvaluator::new(&config.evaluator),
            config.discovery.clone(),
        ))
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Cache key for a category request.
    pub fn fingerprint(category: &str) -> Fingerprint {
        Fingerprint::new(RequestKind::Category, category)
    }

    /// Discover topics using the configured target and attempt budget.
    pub async fn discover_default(&self, category: &str) -> Result<DiscoveryResult, DiscoveryError> {
        self.discover(
            category,
            self.config.target_topic_count,
            self.config.max_attempts,
        )
        .await
    }

    /// Discover up to `target_count` topics for `category`.
    pub async fn discover(
        &self,
        category: &str,
        target_count: usize,
        max_attempts: usize,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        self.discover_with_cancel(category, target_count, max_attempts, &CancellationToken::new())
            .await
    }

    /// Like [`discover`](Self::discover), stopping early when `cancel` fires.
    ///
    /// A cancelled run returns what it accumulated so far with
    /// `termination = Cancelled`; nothing is cached.
    pub async fn discover_with_cancel(
        &self,
        category: &str,
        target_count: usize,
        max_attempts: usize,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        if category.trim().is_empty() {
            return Err(DiscoveryError::InvalidRequest {
                reason: "category must not be empty".into(),
            });
        }
        if target_count == 0 {
            return Err(DiscoveryError::InvalidRequest {
                reason: "target_count must be at least 1".into(),
            });
        }
        if max_attempts == 0 {
            return Err(DiscoveryError::InvalidRequest {
                reason: "max_attempts must be at least 1".into(),
            });
        }

        let fingerprint = Self::fingerprint(category);
        if let Some(topics) = self.cache.get(&fingerprint) {
            return Ok(Self::cache_hit(category, topics, target_count));
        }

        let key_lock = self.key_lock(&fingerprint);
        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(category, "Discovery cancelled while waiting for a concurrent run");
                None
            }
            guard = key_lock.mutex().lock() => Some(guard),
        };
        let Some(_held) = guard else {
            return Ok(RunState::default().finish(target_count, Termination::Cancelled));
        };
        // A concurrent run for the same fingerprint may have filled the cache.
        match self.cache.get(&fingerprint) {
            Some(topics) => Ok(Self::cache_hit(category, topics, target_count)),
            None => {
                self.run(category, &fingerprint, target_count, max_attempts, cancel)
                    .await
            }
        }
    }

    /// Drop the cached result for `category`. Returns whether one existed.
    pub fn invalidate(&self, category: &str) -> bool {
        let removed = self.cache.invalidate(&Self::fingerprint(category));
        info!(category, removed, "Invalidated cached discovery result");
        removed
    }

    fn cache_hit(category: &str, mut topics: Vec<Topic>, target: usize) -> DiscoveryResult {
        topics.truncate(target);
        info!(category, topics = topics.len(), "Serving discovery result from cache");
        DiscoveryResult {
            complete: topics.len() >= target,
            topics,
            termination: Termination::CacheHit,
            attempts: 0,
            oracle_calls: 0,
        }
    }

    async fn run(
        &self,
        category: &str,
        fingerprint: &Fingerprint,
        target: usize,
        max_attempts: usize,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        let batch_size = target + self.config.batch_headroom.max(1);
        let mut state = RunState::default();

        while state.topics.len() < target && state.attempts < max_attempts {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(category, state, target));
            }

            info!(
                category,
                attempt = state.attempts + 1,
                max_attempts,
                batch_size,
                accepted = state.topics.len(),
                "Requesting candidates"
            );
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(self.cancelled(category, state, target)),
                response = self.oracle.request_candidates(category, batch_size) => response,
            };
            state.attempts += 1;

            match response {
                Ok(candidates) => {
                    state.oracle_calls += 1;
                    state.consecutive_failures = 0;
                    let received = candidates.len();
                    let fresh = self.screen(candidates, &state.seen);
                    info!(
                        category,
                        attempt = state.attempts,
                        received,
                        accepted = fresh.len(),
                        "Screened oracle batch"
                    );
                    for topic in fresh {
                        if let Some(lead) = topic.lead() {
                            state.seen.insert(lead.citation.dedup_key());
                        }
                        state.topics.push(topic);
                    }
                }
                Err(error) => {
                    state.consecutive_failures += 1;
                    if !error.is_transient()
                        || state.consecutive_failures >= self.config.max_consecutive_failures
                    {
                        warn!(
                            category,
                            oracle = self.oracle.name(),
                            consecutive_failures = state.consecutive_failures,
                            error = %error,
                            "Aborting discovery"
                        );
                        return Err(DiscoveryError::Aborted {
                            consecutive_failures: state.consecutive_failures,
                            source: error,
                        });
                    }
                    warn!(
                        category,
                        attempt = state.attempts,
                        consecutive_failures = state.consecutive_failures,
                        error = %error,
                        "Oracle call failed"
                    );
                    if state.attempts < max_attempts
                        && !self.backoff(&error, state.consecutive_failures, cancel).await
                    {
                        return Ok(self.cancelled(category, state, target));
                    }
                }
            }
        }

        let termination = if state.topics.len() >= target {
            Termination::TargetReached
        } else if self.config.accept_partial && !state.topics.is_empty() {
            Termination::PartialAccepted
        } else {
            Termination::Exhausted
        };
        let result = state.finish(target, termination);

        if matches!(
            termination,
            Termination::TargetReached | Termination::PartialAccepted
        ) {
            self.cache.put(
                fingerprint.clone(),
                RequestKind::Category,
                result.topics.clone(),
                self.cache.ttl_for(RequestKind::Category),
            );
        }
        info!(
            category,
            termination = ?result.termination,
            topics = result.topics.len(),
            attempts = result.attempts,
            complete = result.complete,
            "Discovery finished"
        );
        Ok(result)
    }

    /// Wait out the backoff. Returns false if cancelled while waiting.
    async fn backoff(&self, error: &OracleError, failures: usize, cancel: &CancellationToken) -> bool {
        let delay = self.config.backoff_delay(failures, error.retry_after_secs());
        if delay.is_zero() {
            return true;
        }
        debug!(delay_ms = delay.as_millis() as u64, "Backing off before next oracle call");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn cancelled(&self, category: &str, state: RunState, target: usize) -> DiscoveryResult {
        info!(
            category,
            attempts = state.attempts,
            accepted = state.topics.len(),
            "Discovery cancelled"
        );
        let mut result = state.finish(target, Termination::Cancelled);
        result.complete = false;
        result
    }

    /// Filter, parse and grade one batch. Topics whose lead citation is in
    /// `seen`, or repeated within the batch, are dropped.
    fn screen(&self, candidates: Vec<RawCandidate>, seen: &HashSet<String>) -> Vec<Topic> {
        let mut batch_keys = HashSet::new();
        let mut accepted = Vec::new();

        for raw in candidates {
            let verdict = self.filter.classify(raw.as_str());
            if !verdict.is_accepted() {
                debug!(?verdict, "Candidate rejected by filter");
                continue;
            }
            let draft = match parse_candidate(&raw) {
                Ok(draft) => draft,
                Err(e) => {
                    debug!(error = %e, "Candidate could not be parsed");
                    continue;
                }
            };
            let name = draft.name.clone();
            let Some(topic) = self.grade_draft(draft) else {
                debug!(topic = %name, "No citation met the minimum grade");
                continue;
            };
            let Some(key) = topic.lead().map(|lead| lead.citation.dedup_key()) else {
                continue;
            };
            if seen.contains(&key) || !batch_keys.insert(key) {
                debug!(topic = %topic.name, "Duplicate lead citation");
                continue;
            }
            debug!(topic = %topic.name, grade = %topic.grade(), "Candidate accepted");
            accepted.push(topic);
        }
        accepted
    }

    /// Grade every citation, keep those at or above the minimum grade, best first.
    fn grade_draft(&self, draft: TopicDraft) -> Option<Topic> {
        let mut citations: Vec<GradedCitation> = draft
            .citations
            .into_iter()
            .filter_map(|c| match self.evaluator.grade(c) {
                Ok(graded) => Some(graded),
                Err(e) => {
                    debug!(error = %e, "Dropping ungradable citation");
                    None
                }
            })
            .filter(|g| g.metrics.grade >= self.config.min_acceptable_grade)
            .collect();
        citations.sort_by(|a, b| b.metrics.total.total_cmp(&a.metrics.total));

        let quality = citations.first()?.metrics.clone();
        Some(Topic {
            id: Uuid::new_v4(),
            name: draft.name,
            description: draft.description,
            expected_effect: draft.expected_effect,
            citations,
            quality,
        })
    }

    fn key_lock(&self, fingerprint: &Fingerprint) -> KeyLock<'_> {
        let mutex = self
            .key_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(fingerprint.clone())
            .or_default()
            .clone();
        KeyLock {
            table: &self.key_locks,
            fingerprint: fingerprint.clone(),
            mutex,
        }
    }
}

type LockTable = Mutex<HashMap<Fingerprint, Arc<tokio::sync::Mutex<()>>>>;

/// A caller's handle on a per-fingerprint lock. Dropping it, including when
/// the discovery future itself is dropped, forgets the table entry once no
/// other caller holds one.
struct KeyLock<'a> {
    table: &'a LockTable,
    fingerprint: Fingerprint,
    mutex: Arc<tokio::sync::Mutex<()>>,
}

impl KeyLock<'_> {
    fn mutex(&self) -> &tokio::sync::Mutex<()> {
        &self.mutex
    }
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.table.lock().unwrap_or_else(|e| e.into_inner());
        // The table's reference plus this handle's.
        if locks
            .get(&self.fingerprint)
            .is_some_and(|lock| Arc::strong_count(lock) == 2)
        {
            locks.remove(&self.fingerprint);
        }
    }
}
