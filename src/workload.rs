//! Synthetic Workload
//!
//! Seeded voice-notes traffic for tuning budgets and eviction strategies.
//! A small hot set of notes receives most of the reads; searches and AI
//! results are computed on a miss and cached read-through, the way the app
//! would after asking the backing services.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheKey, CacheManager, CachePolicy, CacheType, CacheableAiResult, CacheableNote,
    CacheableSearchResults, EvictionStrategy, InMemorySource, InvalidationPattern, Note,
};

const WORDS: &[&str] = &[
    "meeting", "groceries", "idea", "draft", "call", "reminder", "budget", "travel", "recipe",
    "project", "deadline", "review", "voice", "memo", "weekend", "doctor", "invoice", "garden",
];

const MODELS: &[&str] = &["whisper-small", "summarizer-v2", "tagger-v1"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadConfig {
    pub operations: usize,
    pub seed: u64,
    /// Notes in the backing store
    pub note_count: usize,
    /// Share of notes forming the hot set
    pub hot_fraction: f64,
    /// Probability that a note access targets the hot set
    pub hot_probability: f64,
    /// Mean note body length in bytes
    pub mean_note_bytes: usize,
    pub write_ratio: f64,
    pub search_ratio: f64,
    pub ai_ratio: f64,
    /// Probability of invalidating all search results after a write
    pub invalidate_ratio: f64,
    /// Overrides the eviction strategy of every write when set
    pub strategy: Option<EvictionStrategy>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            seed: 42,
            note_count: 2_000,
            hot_fraction: 0.1,
            hot_probability: 0.8,
            mean_note_bytes: 2_048,
            write_ratio: 0.1,
            search_ratio: 0.15,
            ai_ratio: 0.1,
            invalidate_ratio: 0.2,
            strategy: None,
        }
    }
}

/// One simulated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    ReadNote(i64),
    WriteNote(i64),
    Search(String),
    AiResult(i64),
}

/// Counts gathered over one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkloadSummary {
    pub operations: usize,
    pub note_reads: usize,
    pub note_writes: usize,
    pub searches: usize,
    pub ai_requests: usize,
    /// Lookups answered by the cache
    pub cache_hits: usize,
    /// Lookups that fell through to the backing store or a recomputation
    pub cache_misses: usize,
    /// Writes the cache refused
    pub rejected_writes: usize,
    pub invalidations: usize,
    /// Operations naming a note that does not exist
    pub skipped: usize,
    pub elapsed: Duration,
}

impl WorkloadSummary {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

/// Deterministic traffic generator
pub struct Workload {
    config: WorkloadConfig,
    rng: StdRng,
    source: Arc<InMemorySource>,
    notes: Vec<Note>,
}

impl Workload {
    /// Generate the backing notes and register them with a preload source
    pub fn new(config: WorkloadConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let source = Arc::new(InMemorySource::new());
        let notes: Vec<Note> = (0..config.note_count.max(1) as i64)
            .map(|id| random_note(&mut rng, id, config.mean_note_bytes))
            .collect();

        for note in &notes {
            source.insert(note_key(note.id), CacheableNote::new(note.clone()));
        }

        Self {
            config,
            rng,
            source,
            notes,
        }
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Backing store of every note, usable as a preload source
    pub fn source(&self) -> Arc<InMemorySource> {
        Arc::clone(&self.source)
    }

    fn pick_note(&mut self) -> i64 {
        let total = self.notes.len();
        let hot = ((total as f64 * self.config.hot_fraction).ceil() as usize).clamp(1, total);
        if hot == total || self.rng.gen_bool(self.config.hot_probability.clamp(0.0, 1.0)) {
            self.rng.gen_range(0..hot) as i64
        } else {
            self.rng.gen_range(hot..total) as i64
        }
    }

    /// Draw the next operation
    pub fn next_operation(&mut self) -> Operation {
        let roll: f64 = self.rng.gen();
        let write = self.config.write_ratio;
        let search = write + self.config.search_ratio;
        let ai = search + self.config.ai_ratio;

        if roll < write {
            Operation::WriteNote(self.pick_note())
        } else if roll < search {
            // Queries repeat often enough to be worth caching
            let word = WORDS[self.rng.gen_range(0..WORDS.len() / 2)];
            Operation::Search(word.to_string())
        } else if roll < ai {
            Operation::AiResult(self.pick_note())
        } else {
            Operation::ReadNote(self.pick_note())
        }
    }

    fn policy(&self, base: CachePolicy) -> CachePolicy {
        match self.config.strategy {
            Some(strategy) => base.with_strategy(strategy),
            None => base,
        }
    }

    /// Run the configured number of operations against `manager`
    pub async fn run(&mut self, manager: &CacheManager) -> WorkloadSummary {
        let started = Instant::now();
        let mut summary = WorkloadSummary::default();

        for _ in 0..self.config.operations {
            let op = self.next_operation();
            self.apply(manager, op, &mut summary).await;
            summary.operations += 1;
        }

        summary.elapsed = started.elapsed();
        info!(
            operations = summary.operations,
            hit_rate = summary.hit_rate(),
            rejected = summary.rejected_writes,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Workload finished"
        );
        summary
    }

    /// Apply one operation
    pub async fn apply(
        &mut self,
        manager: &CacheManager,
        op: Operation,
        summary: &mut WorkloadSummary,
    ) {
        let index = match op {
            Operation::ReadNote(id) | Operation::WriteNote(id) | Operation::AiResult(id) => {
                match self.note_index(id) {
                    Some(index) => index,
                    None => {
                        summary.skipped += 1;
                        warn!(?op, "Operation names an unknown note, skipping");
                        return;
                    }
                }
            }
            Operation::Search(_) => 0,
        };

        match op {
            Operation::ReadNote(id) => {
                summary.note_reads += 1;
                let key = note_key(id);
                if manager.retrieve(&key).await.is_some() {
                    summary.cache_hits += 1;
                    return;
                }
                summary.cache_misses += 1;
                let note = CacheableNote::new(self.notes[index].clone());
                self.store(manager, key, note, CachePolicy::note_content(), summary)
                    .await;
            }
            Operation::WriteNote(id) => {
                summary.note_writes += 1;
                let mut note = random_note(&mut self.rng, id, self.config.mean_note_bytes);
                note.created_at = self.notes[index].created_at;
                self.notes[index] = note.clone();
                self.source.insert(note_key(id), CacheableNote::new(note.clone()));
                let value = CacheableNote::new(note);
                self.store(manager, note_key(id), value, CachePolicy::note_content(), summary)
                    .await;

                if self.rng.gen_bool(self.config.invalidate_ratio.clamp(0.0, 1.0)) {
                    let result = manager
                        .invalidate(InvalidationPattern::by_type(CacheType::SearchResults))
                        .await;
                    summary.invalidations += 1;
                    debug!(removed = result.removed, "Search results invalidated after edit");
                }
            }
            Operation::Search(query) => {
                summary.searches += 1;
                let key = CacheKey::new(CacheType::SearchResults, query.as_str());
                if manager.retrieve(&key).await.is_some() {
                    summary.cache_hits += 1;
                    return;
                }
                summary.cache_misses += 1;
                let matches: Vec<Note> = self
                    .notes
                    .iter()
                    .filter(|n| n.title.contains(query.as_str()))
                    .take(10)
                    .cloned()
                    .collect();
                let total = self
                    .notes
                    .iter()
                    .filter(|n| n.title.contains(query.as_str()))
                    .count() as u64;
                let results = CacheableSearchResults::new(query, matches).with_total_matches(total);
                self.store(manager, key, results, CachePolicy::search_results(), summary)
                    .await;
            }
            Operation::AiResult(id) => {
                summary.ai_requests += 1;
                // Keyed by the input, so an edited note misses its stale result
                let note = &self.notes[index];
                let input_hash = format!("{:016x}", note_hash(note));
                let key = ai_key(&input_hash);
                if manager.retrieve(&key).await.is_some() {
                    summary.cache_hits += 1;
                    return;
                }
                summary.cache_misses += 1;
                let note = &self.notes[index];
                let summary_text: Vec<&str> = note.content.split_whitespace().take(24).collect();
                let model = MODELS.choose(&mut self.rng).copied().unwrap_or("summarizer-v2");
                let elapsed = Duration::from_millis(self.rng.gen_range(200..2_000));
                let result =
                    CacheableAiResult::new(input_hash, summary_text.join(" "), elapsed, model);
                self.store(manager, key, result, CachePolicy::ai_result(), summary)
                    .await;
            }
        }
    }

    fn note_index(&self, id: i64) -> Option<usize> {
        usize::try_from(id).ok().filter(|&index| index < self.notes.len())
    }

    async fn store(
        &self,
        manager: &CacheManager,
        key: CacheKey,
        value: impl Into<crate::cache::CachedValue>,
        policy: CachePolicy,
        summary: &mut WorkloadSummary,
    ) {
        if let Err(e) = manager.cache(key.clone(), value, self.policy(policy)).await {
            summary.rejected_writes += 1;
            debug!(key = %key, error = %e, "Write rejected");
        }
    }
}

pub fn note_key(id: i64) -> CacheKey {
    CacheKey::new(CacheType::NoteContent, id.to_string())
}

pub fn ai_key(input_hash: &str) -> CacheKey {
    CacheKey::new(CacheType::AiProcessingResult, input_hash)
}

fn random_note(rng: &mut StdRng, id: i64, mean_bytes: usize) -> Note {
    let title = format!(
        "{} {}",
        WORDS.choose(rng).copied().unwrap_or("note"),
        WORDS.choose(rng).copied().unwrap_or("note")
    );

    let target = if mean_bytes == 0 {
        0
    } else {
        rng.gen_range(mean_bytes / 2..=mean_bytes + mean_bytes / 2)
    };
    let mut content = String::with_capacity(target + 16);
    while content.len() < target {
        content.push_str(WORDS.choose(rng).copied().unwrap_or("note"));
        content.push(' ');
    }

    let mut note = Note::new(id, title, content);
    if rng.gen_bool(0.3) {
        note.tags = vec![WORDS.choose(rng).copied().unwrap_or("note").to_string()];
    }
    note
}

fn note_hash(note: &Note) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    note.content.hash(&mut hasher);
    hasher.finish()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;

    fn small_config() -> WorkloadConfig {
        WorkloadConfig {
            operations: 500,
            note_count: 50,
            mean_note_bytes: 128,
            ..WorkloadConfig::default()
        }
    }

    #[test]
    fn test_same_seed_same_operations() {
        let mut a = Workload::new(small_config());
        let mut b = Workload::new(small_config());
        for _ in 0..100 {
            assert_eq!(a.next_operation(), b.next_operation());
        }
    }

    #[test]
    fn test_source_holds_every_note() {
        let workload = Workload::new(small_config());
        assert_eq!(workload.source().len(), 50);
    }

    #[test]
    fn test_hot_set_dominates() {
        let mut workload = Workload::new(WorkloadConfig {
            note_count: 100,
            hot_fraction: 0.1,
            hot_probability: 0.9,
            ..small_config()
        });
        let hot = (0..1_000).filter(|_| workload.pick_note() < 10).count();
        assert!(hot > 800, "hot picks: {hot}");
    }

    #[tokio::test]
    async fn test_run_stays_within_budget() {
        let budget = 8 * 1024;
        let manager = CacheManager::new(CacheConfig::with_budget(budget));
        let mut workload = Workload::new(small_config());

        let summary = workload.run(&manager).await;

        assert_eq!(summary.operations, 500);
        assert_eq!(
            summary.note_reads + summary.note_writes + summary.searches + summary.ai_requests,
            500
        );
        assert!(summary.cache_hits > 0);
        assert!(manager.total_size() <= budget);
    }

    #[tokio::test]
    async fn test_strategy_override_applies() {
        let manager = CacheManager::new(CacheConfig::with_budget(4 * 1024));
        let mut workload = Workload::new(WorkloadConfig {
            strategy: Some(EvictionStrategy::Fifo),
            ..small_config()
        });
        let summary = workload.run(&manager).await;
        assert!(summary.hit_rate() >= 0.0 && summary.hit_rate() <= 1.0);
        assert!(manager.metrics_snapshot().eviction_count > 0);
    }

    #[tokio::test]
    async fn test_unknown_note_is_skipped() {
        let manager = CacheManager::default();
        let mut workload = Workload::new(small_config());
        let mut summary = WorkloadSummary::default();

        for op in [
            Operation::ReadNote(-1),
            Operation::WriteNote(50),
            Operation::AiResult(i64::MAX),
        ] {
            workload.apply(&manager, op, &mut summary).await;
        }

        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.note_reads + summary.note_writes + summary.ai_requests, 0);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_edited_note_misses_stale_ai_result() {
        let manager = CacheManager::default();
        let mut workload = Workload::new(small_config());
        let mut summary = WorkloadSummary::default();

        workload.apply(&manager, Operation::AiResult(3), &mut summary).await;
        workload.apply(&manager, Operation::AiResult(3), &mut summary).await;
        assert_eq!((summary.cache_hits, summary.cache_misses), (1, 1));

        workload.apply(&manager, Operation::WriteNote(3), &mut summary).await;
        workload.apply(&manager, Operation::AiResult(3), &mut summary).await;
        assert_eq!((summary.cache_hits, summary.cache_misses), (1, 2));
    }
}
