//! Usage counters for annotated, viewed, translated and voted terms.
//!
//! Counters are bucketed by calendar month and partitioned by glossary. Store
//! failures never reach the caller: every call is bounded by a timeout, and
//! errors are logged and dropped so the annotation response is unaffected.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use dashmap::DashMap;
use readclearly_types::{CounterCategory, Period, TermCounts, VoteValue, fold_term};
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);
const UNKNOWN_REFERER: &str = "unknown";

#[derive(Debug, Error)]
pub enum CounterStoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
    #[error("counter store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Persistent counter backend.
///
/// Glossary ids and terms arrive already lower-cased.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Stored counts for `terms`; absent terms are left out.
    async fn read(
        &self,
        category: CounterCategory,
        glossary: &str,
        period: Period,
        terms: &[String],
    ) -> Result<TermCounts, CounterStoreError>;

    /// Overwrite counts with the given absolute values.
    async fn upsert(
        &self,
        category: CounterCategory,
        glossary: &str,
        period: Period,
        rows: &TermCounts,
    ) -> Result<(), CounterStoreError>;

    /// Add the given deltas onto stored counts in one step.
    async fn increment(
        &self,
        category: CounterCategory,
        glossary: &str,
        period: Period,
        rows: &TermCounts,
    ) -> Result<(), CounterStoreError>;

    async fn increment_vote(
        &self,
        glossary: &str,
        period: Period,
        term: &str,
        yes: u64,
        no: u64,
    ) -> Result<(), CounterStoreError>;

    async fn increment_run(&self, period: Period, referer: &str) -> Result<(), CounterStoreError>;
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
struct CounterKey {
    category: CounterCategory,
    glossary: String,
    period: Period,
    term: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
struct VoteKey {
    glossary: String,
    period: Period,
    term: String,
}

/// Process-local [`CounterStore`]. Counts are lost on restart.
#[derive(Default)]
pub struct MemoryCounterStore {
    counts: DashMap<CounterKey, u64>,
    votes: DashMap<VoteKey, (u64, u64)>,
    runs: DashMap<(Period, String), u64>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, category: CounterCategory, glossary: &str, period: Period, term: &str) -> u64 {
        let key = CounterKey {
            category,
            glossary: glossary.to_string(),
            period,
            term: term.to_string(),
        };
        self.counts.get(&key).map_or(0, |c| *c)
    }

    /// `(yes, no)` totals for a term.
    pub fn votes(&self, glossary: &str, period: Period, term: &str) -> (u64, u64) {
        let key = VoteKey {
            glossary: glossary.to_string(),
            period,
            term: term.to_string(),
        };
        self.votes.get(&key).map_or((0, 0), |v| *v)
    }

    pub fn runs(&self, period: Period, referer: &str) -> u64 {
        self.runs
            .get(&(period, referer.to_string()))
            .map_or(0, |c| *c)
    }

    fn key(category: CounterCategory, glossary: &str, period: Period, term: &str) -> CounterKey {
        CounterKey {
            category,
            glossary: glossary.to_string(),
            period,
            term: term.to_string(),
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn read(
        &self,
        category: CounterCategory,
        glossary: &str,
        period: Period,
        terms: &[String],
    ) -> Result<TermCounts, CounterStoreError> {
        Ok(terms
            .iter()
            .filter_map(|term| {
                self.counts
                    .get(&Self::key(category, glossary, period, term))
                    .map(|count| (term.clone(), *count))
            })
            .collect())
    }

    async fn upsert(
        &self,
        category: CounterCategory,
        glossary: &str,
        period: Period,
        rows: &TermCounts,
    ) -> Result<(), CounterStoreError> {
        for (term, count) in rows {
            self.counts
                .insert(Self::key(category, glossary, period, term), *count);
        }
        Ok(())
    }

    async fn increment(
        &self,
        category: CounterCategory,
        glossary: &str,
        period: Period,
        rows: &TermCounts,
    ) -> Result<(), CounterStoreError> {
        for (term, delta) in rows {
            *self
                .counts
                .entry(Self::key(category, glossary, period, term))
                .or_default() += *delta;
        }
        Ok(())
    }

    async fn increment_vote(
        &self,
        glossary: &str,
        period: Period,
        term: &str,
        yes: u64,
        no: u64,
    ) -> Result<(), CounterStoreError> {
        let key = VoteKey {
            glossary: glossary.to_string(),
            period,
            term: term.to_string(),
        };
        let mut entry = self.votes.entry(key).or_default();
        entry.0 += yes;
        entry.1 += no;
        Ok(())
    }

    async fn increment_run(&self, period: Period, referer: &str) -> Result<(), CounterStoreError> {
        *self.runs.entry((period, referer.to_string())).or_default() += 1;
        Ok(())
    }
}

/// How [`UsageAggregator::merge`] folds new counts into stored ones.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MergeStrategy {
    /// One additive increment per key.
    #[default]
    Atomic,
    /// Read current values, add, write back. Concurrent merges of the same
    /// key can lose increments.
    ReadModifyWrite,
}

impl MergeStrategy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "atomic" => Some(MergeStrategy::Atomic),
            "legacy" | "read-modify-write" => Some(MergeStrategy::ReadModifyWrite),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct UsageConfig {
    pub strategy: MergeStrategy,
    /// Upper bound for each counter store call.
    pub store_timeout: Duration,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            strategy: MergeStrategy::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

/// Folds per-request counts into the counter store for the current month.
pub struct UsageAggregator {
    store: Arc<dyn CounterStore>,
    config: UsageConfig,
}

impl UsageAggregator {
    pub fn new(store: Arc<dyn CounterStore>, config: UsageConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &UsageConfig {
        &self.config
    }

    pub async fn merge(&self, category: CounterCategory, glossary_id: &str, counts: &TermCounts) {
        self.merge_in(current_period(), category, glossary_id, counts)
            .await;
    }

    /// [`merge`](Self::merge) into an explicit period.
    pub async fn merge_in(
        &self,
        period: Period,
        category: CounterCategory,
        glossary_id: &str,
        counts: &TermCounts,
    ) {
        let rows = fold_counts(counts);
        if rows.is_empty() {
            return;
        }
        let glossary = glossary_id.to_lowercase();

        let result = match self.config.strategy {
            MergeStrategy::Atomic => {
                self.bounded(self.store.increment(category, &glossary, period, &rows))
                    .await
            }
            MergeStrategy::ReadModifyWrite => {
                self.read_modify_write(category, &glossary, period, rows)
                    .await
            }
        };
        match result {
            Ok(()) => debug!(
                %category,
                glossary = %glossary,
                terms = counts.len(),
                "merged counters"
            ),
            Err(err) => warn!(%category, glossary = %glossary, "failed to merge counters: {err}"),
        }
    }

    pub async fn record_vote(&self, term: &str, value: VoteValue, glossary_id: &str) {
        let term = fold_term(term);
        if term.is_empty() {
            return;
        }
        let (yes, no) = value.deltas();
        let glossary = glossary_id.to_lowercase();
        let call = self
            .store
            .increment_vote(&glossary, current_period(), &term, yes, no);
        if let Err(err) = self.bounded(call).await {
            warn!(glossary = %glossary, term = %term, "failed to record vote: {err}");
        }
    }

    /// Count one annotation run for the requesting page.
    pub async fn record_run(&self, referer: Option<&str>) {
        let referer = referer
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map_or_else(|| UNKNOWN_REFERER.to_string(), str::to_lowercase);
        let call = self.store.increment_run(current_period(), &referer);
        if let Err(err) = self.bounded(call).await {
            warn!(referer = %referer, "failed to record run: {err}");
        }
    }

    async fn read_modify_write(
        &self,
        category: CounterCategory,
        glossary: &str,
        period: Period,
        mut rows: TermCounts,
    ) -> Result<(), CounterStoreError> {
        let terms: Vec<String> = rows.keys().cloned().collect();
        let current = self
            .bounded(self.store.read(category, glossary, period, &terms))
            .await?;
        for (term, count) in rows.iter_mut() {
            *count += current.get(term).copied().unwrap_or(0);
        }
        self.bounded(self.store.upsert(category, glossary, period, &rows))
            .await
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, CounterStoreError>>,
    ) -> Result<T, CounterStoreError> {
        tokio::time::timeout(self.config.store_timeout, call)
            .await
            .map_err(|_| CounterStoreError::Timeout(self.config.store_timeout))?
    }
}

/// Current UTC `(year, month)`.
pub fn current_period() -> Period {
    let now = Utc::now();
    Period {
        year: now.year(),
        month: now.month(),
    }
}

/// Lower-case terms, merging keys that fold together and dropping zeros.
fn fold_counts(counts: &TermCounts) -> TermCounts {
    let mut folded = TermCounts::new();
    for (term, count) in counts {
        let term = fold_term(term);
        if term.is_empty() || *count == 0 {
            continue;
        }
        *folded.entry(term).or_default() += *count;
    }
    folded
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const PERIOD: Period = Period {
        year: 2024,
        month: 3,
    };

    fn counts(pairs: &[(&str, u64)]) -> TermCounts {
        pairs.iter().map(|(t, c)| (t.to_string(), *c)).collect()
    }

    fn aggregator(store: &Arc<MemoryCounterStore>, strategy: MergeStrategy) -> UsageAggregator {
        let shared: Arc<dyn CounterStore> = store.clone();
        UsageAggregator::new(
            shared,
            UsageConfig {
                strategy,
                ..UsageConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn merges_are_additive_for_both_strategies() {
        for strategy in [MergeStrategy::Atomic, MergeStrategy::ReadModifyWrite] {
            let store = Arc::new(MemoryCounterStore::new());
            let usage = aggregator(&store, strategy);
            usage
                .merge_in(PERIOD, CounterCategory::Matched, "default.csv", &counts(&[("a", 2)]))
                .await;
            usage
                .merge_in(PERIOD, CounterCategory::Matched, "default.csv", &counts(&[("a", 3)]))
                .await;
            assert_eq!(
                store.count(CounterCategory::Matched, "default.csv", PERIOD, "a"),
                5,
                "{strategy:?}"
            );
        }
    }

    #[tokio::test]
    async fn keys_are_lowercased_and_categories_kept_apart() {
        let store = Arc::new(MemoryCounterStore::new());
        let usage = aggregator(&store, MergeStrategy::Atomic);
        usage
            .merge_in(
                PERIOD,
                CounterCategory::Viewed,
                "Cache/Housing.csv",
                &counts(&[("Lien", 1), ("LIEN", 2), ("eviction", 0)]),
            )
            .await;

        assert_eq!(store.count(CounterCategory::Viewed, "cache/housing.csv", PERIOD, "lien"), 3);
        assert_eq!(store.count(CounterCategory::Matched, "cache/housing.csv", PERIOD, "lien"), 0);
        assert_eq!(store.count(CounterCategory::Viewed, "cache/housing.csv", PERIOD, "eviction"), 0);
    }

    #[tokio::test]
    async fn votes_and_runs_accumulate() {
        let store = Arc::new(MemoryCounterStore::new());
        let usage = aggregator(&store, MergeStrategy::Atomic);
        let period = current_period();

        usage.record_vote("Lien", VoteValue::Yes, "default.csv").await;
        usage.record_vote("lien", VoteValue::Yes, "default.csv").await;
        usage.record_vote("lien", VoteValue::No, "default.csv").await;
        assert_eq!(store.votes("default.csv", period, "lien"), (2, 1));

        usage.record_run(Some("https://Example.org/Page")).await;
        usage.record_run(Some("https://example.org/page")).await;
        usage.record_run(None).await;
        usage.record_run(Some("  ")).await;
        assert_eq!(store.runs(period, "https://example.org/page"), 2);
        assert_eq!(store.runs(period, "unknown"), 2);
    }

    struct BrokenStore {
        calls: AtomicUsize,
        hang: bool,
    }

    impl BrokenStore {
        async fn fail<T>(&self) -> Result<T, CounterStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            Err(CounterStoreError::Unavailable("connection refused".into()))
        }
    }

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn read(
            &self,
            _: CounterCategory,
            _: &str,
            _: Period,
            _: &[String],
        ) -> Result<TermCounts, CounterStoreError> {
            self.fail().await
        }

        async fn upsert(
            &self,
            _: CounterCategory,
            _: &str,
            _: Period,
            _: &TermCounts,
        ) -> Result<(), CounterStoreError> {
            self.fail().await
        }

        async fn increment(
            &self,
            _: CounterCategory,
            _: &str,
            _: Period,
            _: &TermCounts,
        ) -> Result<(), CounterStoreError> {
            self.fail().await
        }

        async fn increment_vote(
            &self,
            _: &str,
            _: Period,
            _: &str,
            _: u64,
            _: u64,
        ) -> Result<(), CounterStoreError> {
            self.fail().await
        }

        async fn increment_run(&self, _: Period, _: &str) -> Result<(), CounterStoreError> {
            self.fail().await
        }
    }

    fn broken(hang: bool, strategy: MergeStrategy) -> (Arc<BrokenStore>, UsageAggregator) {
        let store = Arc::new(BrokenStore {
            calls: AtomicUsize::new(0),
            hang,
        });
        let shared: Arc<dyn CounterStore> = store.clone();
        let usage = UsageAggregator::new(
            shared,
            UsageConfig {
                strategy,
                store_timeout: Duration::from_millis(50),
            },
        );
        (store, usage)
    }

    #[tokio::test]
    async fn store_failures_are_swallowed() {
        let (store, usage) = broken(false, MergeStrategy::ReadModifyWrite);
        usage
            .merge_in(PERIOD, CounterCategory::Unmatched, "default.csv", &counts(&[("landlord", 1)]))
            .await;
        usage.record_vote("lien", VoteValue::No, "default.csv").await;
        usage.record_run(None).await;
        // The failed read stops the legacy merge before its upsert.
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_store_calls_time_out() {
        let (store, usage) = broken(true, MergeStrategy::Atomic);
        usage
            .merge_in(PERIOD, CounterCategory::Matched, "default.csv", &counts(&[("lien", 1)]))
            .await;
        usage.record_run(Some("https://example.org")).await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_counts_skip_the_store() {
        let (store, usage) = broken(false, MergeStrategy::Atomic);
        usage
            .merge_in(PERIOD, CounterCategory::Matched, "default.csv", &TermCounts::new())
            .await;
        usage
            .merge_in(PERIOD, CounterCategory::Matched, "default.csv", &counts(&[("lien", 0)]))
            .await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn parses_merge_strategies() {
        assert_eq!(MergeStrategy::parse("atomic"), Some(MergeStrategy::Atomic));
        assert_eq!(MergeStrategy::parse(" Legacy "), Some(MergeStrategy::ReadModifyWrite));
        assert_eq!(MergeStrategy::parse("eventual"), None);
    }
}
