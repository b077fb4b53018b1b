//! Property-Based Tests for the Cache
//!
//! # Test Properties
//!
//! 1. **Budget**: the accounted total never exceeds the budget after a write
//! 2. **Roundtrip**: every value kind survives compress → decompress,
//!    whatever bytes its text holds
//! 3. **Victim Order**: priority always precedes strategy
//! 4. **Payloads**: pack → unpack is the identity for arbitrary frames

#![cfg(test)]

use std::time::Duration;

use proptest::prelude::*;

use super::compression::CompressionManager;
use super::data::{CacheableAiResult, CacheableData, CacheableNote, CacheableSearchResults, Note};
use super::entry::{CacheKey, CacheType};
use super::manager::{CacheConfig, CacheManager};
use super::policy::{order_victims, CachePolicy, CachePriority, EvictionCandidate, EvictionStrategy};

// =============================================================================
// Property Strategies
// =============================================================================

fn eviction_strategy() -> impl Strategy<Value = EvictionStrategy> {
    prop_oneof![
        Just(EvictionStrategy::Lru),
        Just(EvictionStrategy::Lfu),
        Just(EvictionStrategy::Fifo),
        Just(EvictionStrategy::TtlBased),
    ]
}

fn priority_strategy() -> impl Strategy<Value = CachePriority> {
    prop_oneof![
        Just(CachePriority::Low),
        Just(CachePriority::Normal),
        Just(CachePriority::High),
        Just(CachePriority::Critical),
    ]
}

/// Free text biased towards separator-like characters
fn text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<String>(),
        "[|:;,\\n\\t\\\\ a-z]{0,64}",
        "\\PC{0,32}",
    ]
}

fn note_strategy() -> impl Strategy<Value = Note> {
    (
        any::<i64>(),
        text_strategy(),
        text_strategy(),
        proptest::option::of(text_strategy()),
        prop::collection::vec(text_strategy(), 0..5),
    )
        .prop_map(|(id, title, content, summary, tags)| {
            let mut note = Note::new(id, title, content);
            note.summary = summary;
            note.tags = tags;
            note
        })
}

/// One write: key id, content length, strategy, priority
fn write_strategy() -> impl Strategy<Value = (u8, usize, EvictionStrategy, CachePriority)> {
    (0u8..24, 0usize..400, eviction_strategy(), priority_strategy())
}

// =============================================================================
// Budget Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: no sequence of writes pushes the accounted size past the budget.
    #[test]
    fn prop_budget_invariant(writes in prop::collection::vec(write_strategy(), 1..60)) {
        let budget = 1_000u64;
        let manager = CacheManager::new(CacheConfig::with_budget(budget));

        for (id, len, strategy, priority) in writes {
            let key = CacheKey::new(CacheType::NoteContent, id.to_string());
            let note = CacheableNote::new(Note::new(id as i64, "", "n".repeat(len)));
            let policy = CachePolicy::default()
                .with_strategy(strategy)
                .with_priority(priority)
                .with_compression(len % 2 == 0);

            tokio_test::block_on(manager.cache(key.clone(), note, policy))?;

            let metrics = manager.metrics_snapshot();
            prop_assert!(metrics.total_size <= budget);
            prop_assert_eq!(metrics.total_size, manager.total_size());
            prop_assert!(manager.contains(&key));
        }
    }

    /// Property: the newest write is always retrievable with its content intact.
    #[test]
    fn prop_last_write_wins(contents in prop::collection::vec("[a-z]{0,50}", 1..20)) {
        let manager = CacheManager::new(CacheConfig::with_budget(10_000));
        let key = CacheKey::new(CacheType::NoteContent, "same");

        for content in &contents {
            let note = CacheableNote::new(Note::new(1, "t", content.clone()));
            tokio_test::block_on(manager.cache(key.clone(), note, CachePolicy::default()))?;
        }

        let value = tokio_test::block_on(manager.retrieve(&key));
        let last = contents.last().cloned().unwrap_or_default();
        prop_assert_eq!(value.and_then(|v| v.into_note()).map(|n| n.note.content), Some(last));
        prop_assert_eq!(manager.len(), 1);
    }
}

// =============================================================================
// Roundtrip Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_note_roundtrip(note in note_strategy()) {
        let original = CacheableNote::new(note);
        let restored = original.decompress(&original.compress()?)?;

        prop_assert_eq!(&restored.note, &original.note);
        prop_assert_eq!(restored.access_count(), original.access_count() + 1);
        prop_assert_eq!(restored.size(), original.size());
    }

    #[test]
    fn prop_search_results_roundtrip(
        query in text_strategy(),
        results in prop::collection::vec(note_strategy(), 0..4),
        total in any::<u64>(),
    ) {
        let original = CacheableSearchResults::new(query, results).with_total_matches(total);
        let restored = original.decompress(&original.compress()?)?;

        prop_assert_eq!(&restored.query, &original.query);
        prop_assert_eq!(&restored.results, &original.results);
        prop_assert_eq!(restored.total_matches, total);
        prop_assert_eq!(restored.searched_at, original.searched_at);
    }

    #[test]
    fn prop_ai_result_roundtrip(
        hash in text_strategy(),
        result in text_strategy(),
        millis in any::<u32>(),
        model in text_strategy(),
    ) {
        let original =
            CacheableAiResult::new(hash, result, Duration::from_millis(millis as u64), model);
        let restored = original.decompress(&original.compress()?)?;

        prop_assert_eq!(&restored.input_hash, &original.input_hash);
        prop_assert_eq!(&restored.result, &original.result);
        prop_assert_eq!(restored.processing_time, original.processing_time);
        prop_assert_eq!(&restored.model_name, &original.model_name);
    }

    #[test]
    fn prop_pack_unpack_identity(
        frame in prop::collection::vec(any::<u8>(), 0..4096),
        compress in any::<bool>(),
    ) {
        let codec = CompressionManager::new();
        let payload = codec.pack(&frame, compress)?;
        let unpacked = codec.unpack(&payload)?;
        prop_assert_eq!(unpacked.as_ref(), frame.as_slice());
        prop_assert!(payload.len() <= frame.len() + 1);
    }
}

// =============================================================================
// Victim Order Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: ordered victims never place a higher priority before a lower one.
    #[test]
    fn prop_priority_precedes_strategy(
        strategy in eviction_strategy(),
        specs in prop::collection::vec(
            (priority_strategy(), any::<u32>(), any::<u64>(), any::<u64>(), 0u64..10_000),
            1..40,
        ),
    ) {
        let keys: Vec<CacheKey> = (0..specs.len())
            .map(|i| CacheKey::new(CacheType::NoteContent, i.to_string()))
            .collect();
        let mut candidates: Vec<EvictionCandidate<'_>> = specs
            .iter()
            .zip(&keys)
            .map(|(&(priority, access_count, access_tick, insert_tick, ttl), key)| EvictionCandidate {
                key,
                priority,
                access_count,
                access_tick,
                insert_tick,
                remaining_ttl: Duration::from_secs(ttl),
            })
            .collect();

        order_victims(strategy, &mut candidates);

        for pair in candidates.windows(2) {
            prop_assert!(pair[0].priority <= pair[1].priority);
            if pair[0].priority == pair[1].priority {
                prop_assert_ne!(strategy.compare(&pair[0], &pair[1]), std::cmp::Ordering::Greater);
            }
        }
    }
}
