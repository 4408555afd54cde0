//! Merging of results coming from several retrievers or queries.

use std::collections::HashMap;

use ragbot_types::{RetrievalResult, ScoredSegment};

/// Lowercased text with whitespace runs collapsed, used as the dedupe key.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Concatenate result lists, dropping duplicate content.
///
/// Of two segments with the same normalized text the higher score survives,
/// in the position of the first occurrence. The output is sorted by descending
/// score (stable) and capped at `ceiling`.
pub fn merge_results(
    results: impl IntoIterator<Item = RetrievalResult>,
    ceiling: usize,
) -> Vec<ScoredSegment> {
    let mut merged: Vec<ScoredSegment> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for scored in results.into_iter().flatten() {
        let key = normalize_text(&scored.segment.text);
        match positions.get(&key) {
            Some(&pos) => {
                if scored.score > merged[pos].score {
                    merged[pos] = scored;
                }
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(scored);
            }
        }
    }

    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.truncate(ceiling);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragbot_types::Segment;

    fn hit(source: &str, text: &str, score: f32) -> ScoredSegment {
        ScoredSegment::new(Segment::new(format!("{source}:{text}"), text, source), score)
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello\n\tWORLD  "), "hello world");
    }

    #[test]
    fn test_hybrid_merge_dedupes_overlap() {
        let local = vec![
            hit("docs", "Rust 2024 edition shipped.", 0.9),
            hit("docs", "Cargo resolver v3.", 0.7),
            hit("docs", "Async closures are stable.", 0.6),
        ];
        let web = vec![
            hit("web", "rust 2024   edition shipped.", 0.95),
            hit("web", "Let chains landed.", 0.5),
            hit("web", "Edition guide updated.", 0.4),
        ];

        let merged = merge_results(vec![local, web], 6);
        assert_eq!(merged.len(), 5);
        assert_eq!(merged[0].score, 0.95);
        assert_eq!(merged[0].segment.source_id, "web");
        assert!(merged.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_merge_keeps_existing_when_higher() {
        let merged = merge_results(
            vec![vec![hit("a", "same", 0.8)], vec![hit("b", "Same", 0.3)]],
            5,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].segment.source_id, "a");
    }

    #[test]
    fn test_merge_ceiling_and_stable_ties() {
        let merged = merge_results(
            vec![
                vec![hit("a", "one", 0.5), hit("a", "two", 0.5)],
                vec![hit("b", "three", 0.5)],
            ],
            2,
        );
        let texts: Vec<&str> = merged.iter().map(|s| s.segment.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn test_merge_nothing() {
        assert!(merge_results(Vec::<RetrievalResult>::new(), 3).is_empty());
    }
}
