//! Property tests for the deterministic building blocks.

mod common;

use codescope::embed::CachedEmbedder;
use codescope::extract::chunk_fallback;
use codescope::ident::symbol_id;
use codescope::merkle::{MerkleCache, MerkleEntry};
use common::MockEmbedder;
use proptest::prelude::*;
use std::sync::Arc;

fn entry(hash: &str) -> MerkleEntry {
    MerkleEntry {
        hash: hash.to_string(),
        mtime_ms: 0,
        size: 0,
    }
}

proptest! {
    /// The Merkle root depends only on the (path, hash) set, never on
    /// insertion order.
    #[test]
    fn merkle_root_is_order_independent(
        mut files in proptest::collection::hash_map("[a-z]{1,12}", "[0-9a-f]{16}", 0..40)
    ) {
        let pairs: Vec<(String, String)> = files.drain().collect();

        let mut forward = MerkleCache::new();
        for (path, hash) in &pairs {
            forward.insert(path, entry(hash));
        }

        let mut reversed = MerkleCache::new();
        for (path, hash) in pairs.iter().rev() {
            reversed.insert(path, entry(hash));
        }

        prop_assert_eq!(forward.build_tree(), reversed.build_tree());
    }

    /// Changing one file's hash changes the root.
    #[test]
    fn merkle_root_tracks_content(
        paths in proptest::collection::btree_set("[a-z]{1,10}", 1..20),
        victim_index in 0usize..20
    ) {
        let paths: Vec<String> = paths.into_iter().collect();
        let victim = victim_index % paths.len();

        let mut original = MerkleCache::new();
        let mut mutated = MerkleCache::new();
        for (i, path) in paths.iter().enumerate() {
            original.insert(path, entry("aaaa"));
            mutated.insert(path, entry(if i == victim { "bbbb" } else { "aaaa" }));
        }

        prop_assert_ne!(original.build_tree(), mutated.build_tree());
    }

    /// Fallback chunks cover the whole file, in order, within bounds.
    #[test]
    fn chunker_covers_every_line(
        line_count in 1usize..400,
        max_lines in 2u32..120,
        overlap_ratio in 0u32..100
    ) {
        let overlap = (max_lines - 1) * overlap_ratio / 100;
        let source: String = (0..line_count)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");

        let chunks = chunk_fallback(&source, "file.txt", max_lines, overlap);

        prop_assert!(!chunks.is_empty());
        prop_assert_eq!(chunks[0].start_line, 1);
        prop_assert_eq!(chunks.last().unwrap().end_line as usize, line_count);
        for chunk in &chunks {
            prop_assert!(chunk.end_line >= chunk.start_line);
            prop_assert!((chunk.end_line - chunk.start_line + 1) <= max_lines);
        }
        // Consecutive chunks leave no gap.
        for pair in chunks.windows(2) {
            prop_assert!(pair[1].start_line <= pair[0].end_line + 1);
            prop_assert!(pair[1].start_line > pair[0].start_line);
        }
    }

    /// The embedder LRU never exceeds its capacity.
    #[test]
    fn lru_is_bounded(texts in proptest::collection::vec("[a-z]{1,8}", 0..60)) {
        let cached = CachedEmbedder::with_capacity(Arc::new(MockEmbedder), 16, 8);
        for text in &texts {
            cached.embed(text).unwrap();
        }
        prop_assert!(cached.cached_len() <= 8);
    }

    /// Symbol ids are always 16 lowercase hex chars, stable per input.
    #[test]
    fn symbol_ids_are_16_hex_and_stable(
        qualified in "[ -~]{1,64}",
        signature in proptest::option::of("[ -~]{0,32}"),
        language in "[a-z]{1,10}"
    ) {
        let id = symbol_id(&qualified, signature.as_deref(), &language);
        prop_assert_eq!(id.len(), 16);
        prop_assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        prop_assert_eq!(id, symbol_id(&qualified, signature.as_deref(), &language));
    }
}
