//! Property tests for boundary chunking.

use flare_rag::{BoundaryChunker, Chunker};
use proptest::prelude::*;

/// Text built from words, sentence terminators and newlines, including
/// multi-byte characters.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            4 => "[a-zé]{1,9}",
            1 => Just(". ".to_string()),
            1 => Just("! ".to_string()),
            1 => Just("? ".to_string()),
            1 => Just("\n".to_string()),
            2 => Just(" ".to_string()),
        ],
        0..200,
    )
    .prop_map(|parts| parts.concat())
}

/// Valid `(chunk_size, chunk_overlap)` pairs.
fn arb_params() -> impl Strategy<Value = (usize, usize)> {
    (1usize..120).prop_flat_map(|size| (Just(size), 0..size))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn short_text_is_one_trimmed_chunk(text in arb_text(), extra in 1usize..50) {
        let size = text.chars().count() + extra;
        let chunks = BoundaryChunker::new(size, size / 2).unwrap().split(&text);
        if text.trim().is_empty() {
            prop_assert!(chunks.is_empty());
        } else {
            prop_assert_eq!(chunks.len(), 1);
            prop_assert_eq!(chunks[0].text.as_str(), text.trim());
        }
    }

    #[test]
    fn windows_cover_every_visible_character(text in arb_text(), (size, overlap) in arb_params()) {
        let chars: Vec<char> = text.chars().collect();
        let chunks = BoundaryChunker::new(size, overlap).unwrap().split(&text);

        for (i, c) in chars.iter().enumerate() {
            if !c.is_whitespace() {
                prop_assert!(
                    chunks.iter().any(|chunk| chunk.start <= i && i < chunk.end),
                    "character {} ({:?}) not covered", i, c
                );
            }
        }
    }

    #[test]
    fn chunks_respect_size_and_order(text in arb_text(), (size, overlap) in arb_params()) {
        let chars: Vec<char> = text.chars().collect();
        let chunks = BoundaryChunker::new(size, overlap).unwrap().split(&text);

        for chunk in &chunks {
            prop_assert!(chunk.end - chunk.start <= size);
            prop_assert!(chunk.text.chars().count() <= size);
            prop_assert!(!chunk.text.is_empty());
            let window: String = chars[chunk.start..chunk.end].iter().collect();
            prop_assert_eq!(chunk.text.as_str(), window.trim());
        }
        for pair in chunks.windows(2) {
            prop_assert!(pair[0].start < pair[1].start);
        }
    }

    #[test]
    fn chunking_is_deterministic(text in arb_text(), (size, overlap) in arb_params()) {
        let chunker = BoundaryChunker::new(size, overlap).unwrap();
        prop_assert_eq!(chunker.split(&text), chunker.split(&text));
    }
}

#[test]
fn invalid_parameters_are_config_errors() {
    assert!(BoundaryChunker::new(0, 0).unwrap_err().is_config_error());
    assert!(BoundaryChunker::new(10, 10).unwrap_err().is_config_error());
    assert!(flare_rag::chunking::split("text", 5, 7).is_err());
}

#[test]
fn hard_cut_windows_overlap_by_configured_amount() {
    let text = "x".repeat(25);
    let chunks = BoundaryChunker::new(10, 3).unwrap().split(&text);
    let spans: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
    assert_eq!(spans, vec![(0, 10), (7, 17), (14, 24), (21, 25)]);
}
