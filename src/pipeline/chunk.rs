//! Page-aligned chunking of extracted text.
//!
//! Pages are accumulated in order into chunks no larger than the budget. A
//! chunk boundary always falls between pages, never inside one, so every
//! summary can be traced back to the exact pages it covers.
//!
//! Sizes are counted in characters (Unicode scalar values), including the
//! `"\n\n"` separator placed between non-empty page texts. Empty pages add
//! nothing to the size but still appear in the covering chunk's page list.

use serde::{Deserialize, Serialize};

/// Separator inserted between page texts inside a chunk.
pub const PAGE_SEPARATOR: &str = "\n\n";

const SEPARATOR_CHARS: usize = 2;

/// A group of contiguous pages summarised in one model call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 1-based chunk number.
    pub index: usize,
    /// Page numbers covered, ascending and contiguous.
    pub pages: Vec<usize>,
    pub text: String,
    /// Character count of `text`.
    pub char_count: usize,
}

impl Chunk {
    /// True when this chunk exceeds `budget` because a single page does.
    pub fn is_oversized(&self, budget: usize) -> bool {
        self.char_count > budget
    }
}

/// Group `(page_index, text)` pairs into page-aligned chunks of at most `budget` characters.
///
/// A page whose text alone exceeds `budget` becomes its own chunk, untruncated.
/// `budget` of zero is treated as one.
pub fn chunk_pages<S: AsRef<str>>(page_texts: &[(usize, S)], budget: usize) -> Vec<Chunk> {
    let budget = budget.max(1);
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut pages: Vec<usize> = Vec::new();
    let mut text = String::new();
    let mut chars = 0usize;

    for (page, page_text) in page_texts {
        let page_text = page_text.as_ref();
        let add = page_text.chars().count();
        let sep = if chars > 0 && add > 0 { SEPARATOR_CHARS } else { 0 };

        if !pages.is_empty() && add > 0 && chars > 0 && chars + sep + add > budget {
            flush(&mut chunks, &mut pages, &mut text, &mut chars);
        }

        if add > 0 {
            if chars > 0 {
                text.push_str(PAGE_SEPARATOR);
                chars += SEPARATOR_CHARS;
            }
            text.push_str(page_text);
            chars += add;
        }
        pages.push(*page);
    }

    if !pages.is_empty() {
        flush(&mut chunks, &mut pages, &mut text, &mut chars);
    }
    chunks
}

fn flush(chunks: &mut Vec<Chunk>, pages: &mut Vec<usize>, text: &mut String, chars: &mut usize) {
    chunks.push(Chunk {
        index: chunks.len() + 1,
        pages: std::mem::take(pages),
        text: std::mem::take(text),
        char_count: *chars,
    });
    *chars = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(lens: &[usize]) -> Vec<(usize, String)> {
        lens.iter()
            .enumerate()
            .map(|(i, &n)| (i + 1, "x".repeat(n)))
            .collect()
    }

    fn covered(chunks: &[Chunk]) -> Vec<Vec<usize>> {
        chunks.iter().map(|c| c.pages.clone()).collect()
    }

    #[test]
    fn greedy_packing_under_small_budget() {
        // 800 + 2 + 50 fits in 1000; 800 + 2 + 800 does not.
        let chunks = chunk_pages(&pages(&[800, 800, 50]), 1000);
        assert_eq!(covered(&chunks), vec![vec![1], vec![2, 3]]);
        assert_eq!(chunks[1].char_count, 852);
    }

    #[test]
    fn single_chunk_under_large_budget() {
        let chunks = chunk_pages(&pages(&[800, 800, 50]), 2000);
        assert_eq!(covered(&chunks), vec![vec![1, 2, 3]]);
        assert_eq!(chunks[0].char_count, 1654);
        assert_eq!(chunks[0].index, 1);
    }

    #[test]
    fn each_page_alone_when_pairs_overflow() {
        let chunks = chunk_pages(&pages(&[800, 800, 800]), 1000);
        assert_eq!(covered(&chunks), vec![vec![1], vec![2], vec![3]]);
        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn oversized_page_is_kept_whole() {
        let chunks = chunk_pages(&pages(&[100, 5000, 100]), 1000);
        assert_eq!(covered(&chunks), vec![vec![1], vec![2], vec![3]]);
        assert_eq!(chunks[1].text.len(), 5000);
        assert!(chunks[1].is_oversized(1000));
        assert!(!chunks[0].is_oversized(1000));
    }

    #[test]
    fn empty_pages_keep_their_slot() {
        let input = vec![
            (1, "a".repeat(600)),
            (2, String::new()),
            (3, "b".repeat(300)),
        ];
        let chunks = chunk_pages(&input, 1000);
        assert_eq!(covered(&chunks), vec![vec![1, 2, 3]]);
        assert_eq!(chunks[0].char_count, 902);
        assert!(!chunks[0].text.contains("\n\n\n"));
    }

    #[test]
    fn empty_page_after_full_chunk_does_not_split() {
        let input = vec![(1, "a".repeat(1000)), (2, String::new()), (3, "b".repeat(10))];
        let chunks = chunk_pages(&input, 1000);
        assert_eq!(covered(&chunks), vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn leading_empty_pages_join_first_text() {
        let input = vec![(1, String::new()), (2, "a".repeat(10))];
        let chunks = chunk_pages(&input, 5);
        assert_eq!(covered(&chunks), vec![vec![1, 2]]);
        assert_eq!(chunks[0].text, "a".repeat(10));
    }

    #[test]
    fn all_empty_pages_form_one_empty_chunk() {
        let input = vec![(1, String::new()), (2, String::new())];
        let chunks = chunk_pages(&input, 100);
        assert_eq!(covered(&chunks), vec![vec![1, 2]]);
        assert_eq!(chunks[0].char_count, 0);
    }

    #[test]
    fn no_pages_no_chunks() {
        let input: Vec<(usize, String)> = Vec::new();
        assert!(chunk_pages(&input, 100).is_empty());
    }

    #[test]
    fn counts_characters_not_bytes() {
        let input = vec![(1, "é".repeat(6)), (2, "é".repeat(2))];
        let chunks = chunk_pages(&input, 10);
        assert_eq!(covered(&chunks), vec![vec![1, 2]]);
        assert_eq!(chunks[0].char_count, 10);
    }

    #[test]
    fn partition_and_budget_hold_across_budgets() {
        let lens = [0, 13, 400, 999, 1, 0, 250, 250, 250, 3000, 7, 0, 640];
        for budget in [1, 10, 100, 500, 1000, 2500, 10_000] {
            let input = pages(&lens);
            let chunks = chunk_pages(&input, budget);

            let flat: Vec<usize> = chunks.iter().flat_map(|c| c.pages.clone()).collect();
            assert_eq!(flat, (1..=lens.len()).collect::<Vec<_>>(), "budget {budget}");

            for c in &chunks {
                assert!(c.pages.windows(2).all(|w| w[1] == w[0] + 1));
                assert_eq!(c.char_count, c.text.chars().count());
                let single_page = c.pages.iter().filter(|&&p| lens[p - 1] > 0).count() <= 1;
                if !single_page {
                    assert!(c.char_count <= budget, "budget {budget}: {}", c.char_count);
                }
            }
        }
    }
}
