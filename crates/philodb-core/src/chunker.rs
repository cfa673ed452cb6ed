//! Fixed-size overlapping text splitter.
//!
//! Chunks are exact slices of the input: dropping the first `overlap`
//! characters of every chunk after the first and concatenating gives the
//! original text back. Non-final chunks are `min_size..=max_size` characters;
//! the end of a chunk is pulled back to a sentence terminator when one sits
//! inside the lookback window.

use crate::config::ChunkingConfig;
use crate::error::Result;

/// Split `text` into overlapping chunks. Empty input yields no chunks; input
/// no longer than `max_size` yields exactly one.
pub fn split_text<'a>(text: &'a str, cfg: &ChunkingConfig) -> Result<Vec<&'a str>> {
    cfg.validate()?;
    if text.is_empty() { return Ok(Vec::new()); }

    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let n = chars.len();
    if n <= cfg.max_size { return Ok(vec![text]); }
    let byte_at = |i: usize| if i == n { text.len() } else { chars[i].0 };

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let hard_end = start.saturating_add(cfg.max_size).min(n);
        if hard_end == n {
            chunks.push(&text[byte_at(start)..]);
            break;
        }
        let end = sentence_break(&chars, start.saturating_add(cfg.min_size), hard_end, cfg.lookback).unwrap_or(hard_end);
        chunks.push(&text[byte_at(start)..byte_at(end)]);
        // end >= start + min_size > start + overlap, so this always advances
        start = end - cfg.overlap;
    }
    Ok(chunks)
}

/// Largest `e` in the window such that `chars[e - 1]` ends a sentence and
/// `chars[e]` is whitespace.
fn sentence_break(chars: &[(usize, char)], floor: usize, hard_end: usize, lookback: usize) -> Option<usize> {
    let lower = floor.max(hard_end.saturating_sub(lookback)).max(1);
    if lower > hard_end { return None; }
    (lower..=hard_end).rev().find(|&e| {
        matches!(chars[e - 1].1, '.' | '!' | '?') && chars.get(e).is_some_and(|(_, c)| c.is_whitespace())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(min_size: usize, max_size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig { min_size, max_size, overlap, lookback: 200 }
    }

    fn reassemble(chunks: &[&str], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 { out.push_str(c); } else { out.extend(c.chars().skip(overlap)); }
        }
        out
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_text("", &ChunkingConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_text("Consciousness is puzzling.", &ChunkingConfig::default()).unwrap();
        assert_eq!(chunks, vec!["Consciousness is puzzling."]);
    }

    #[test]
    fn prefers_sentence_boundaries() {
        let text = "Alpha beta gamma. Delta epsilon zeta eta theta iota kappa lambda mu nu xi omicron.";
        let chunks = split_text(text, &cfg(10, 40, 4)).unwrap();
        assert!(chunks[0].ends_with("gamma."), "first chunk was {:?}", chunks[0]);
        assert_eq!(reassemble(&chunks, 4), text);
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let text = "x".repeat(95);
        let chunks = split_text(&text, &cfg(20, 30, 5)).unwrap();
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(5).collect::<Vec<_>>().into_iter().rev().collect();
            let head: String = pair[1].chars().take(5).collect();
            assert_eq!(tail, head);
        }
        for c in &chunks[..chunks.len() - 1] { assert_eq!(c.chars().count(), 30); }
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "ß∂ƒ©˙∆˚¬…æ".repeat(20);
        let chunks = split_text(&text, &cfg(15, 25, 3)).unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(reassemble(&chunks, 3), text);
    }

    #[test]
    fn rejects_overlap_not_below_min() {
        assert!(split_text("anything", &cfg(10, 20, 10)).is_err());
    }

    #[test]
    fn rejects_oversized_max() {
        let err = split_text("anything", &cfg(10, usize::MAX, 5)).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidConfig(_)), "{err}");
        assert_eq!(split_text("anything", &cfg(10, ChunkingConfig::MAX_CHUNK_SIZE, 5)).unwrap(), vec!["anything"]);
    }

    mod proptest_chunker {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(500))]

            #[test]
            fn chunks_reconstruct_source(
                text in "[a-zA-Z .!?\\n]{0,3000}",
                min_size in 10usize..100,
                extra in 0usize..200,
                overlap_seed in 0usize..100,
            ) {
                let overlap = overlap_seed % min_size;
                let c = ChunkingConfig { min_size, max_size: min_size + extra, overlap, lookback: 50 };
                let chunks = split_text(&text, &c).unwrap();
                prop_assert_eq!(reassemble(&chunks, overlap), text.clone());
                if !text.is_empty() { prop_assert!(!chunks.is_empty()); }
                for ch in chunks.iter().take(chunks.len().saturating_sub(1)) {
                    let len = ch.chars().count();
                    prop_assert!(len >= c.min_size && len <= c.max_size, "len {} outside bounds", len);
                }
            }
        }
    }
}
