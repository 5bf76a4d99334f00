//! Reciprocal rank fusion over ranked identifier lists.

use std::collections::HashMap;

/// Reciprocal rank fusion score of one identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedRank {
    /// Canonical chunk identifier.
    pub doc_id: String,
    /// Sum of `1 / (k + rank)` over the lists containing the identifier.
    pub score: f64,
}

fn rrf_contribution(k: f64, rank: usize) -> f64 {
    1.0 / (k + rank as f64)
}

/// Fuse ranked identifier lists, best first.
///
/// Ranks are 1-based; an identifier repeated within one list counts at its first rank only.
/// Equal scores keep the order in which identifiers were first seen.
pub fn fuse_rankings(lists: &[Vec<String>], k: f64) -> Vec<FusedRank> {
    let mut fused: Vec<FusedRank> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for list in lists {
        let mut seen_in_list = std::collections::HashSet::new();
        for (idx, doc_id) in list.iter().enumerate() {
            if !seen_in_list.insert(doc_id.as_str()) {
                continue;
            }
            let contribution = rrf_contribution(k, idx + 1);
            match positions.get(doc_id.as_str()) {
                Some(&position) => fused[position].score += contribution,
                None => {
                    positions.insert(doc_id.as_str(), fused.len());
                    fused.push(FusedRank {
                        doc_id: doc_id.clone(),
                        score: contribution,
                    });
                }
            }
        }
    }

    // Stable sort keeps first-seen order for ties.
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn documents_in_both_lists_rank_first() {
        let fused = fuse_rankings(&[ids(&["A", "B", "C"]), ids(&["C", "D"])], 60.0);
        let order: Vec<&str> = fused.iter().map(|rank| rank.doc_id.as_str()).collect();
        assert_eq!(order, vec!["C", "A", "B", "D"]);
        assert!((fused[0].score - (1.0 / 63.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert!((fused[1].score - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn top_rank_in_both_lists_beats_top_rank_in_one() {
        let fused = fuse_rankings(&[ids(&["A", "B"]), ids(&["A"])], 60.0);
        assert_eq!(fused[0].doc_id, "A");
        assert_eq!(fused[1].doc_id, "B");
        assert!(fused[0].score > fused[1].score);

        let fused = fuse_rankings(&[ids(&["A"]), ids(&["A"]), ids(&["C"])], 60.0);
        let score = |id: &str| fused.iter().find(|rank| rank.doc_id == id).map(|rank| rank.score);
        assert!(score("A") > score("C"));
        assert!((fused[0].score - 2.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn ties_keep_first_appearance() {
        let fused = fuse_rankings(&[ids(&["X"]), ids(&["Y"])], 60.0);
        let order: Vec<&str> = fused.iter().map(|rank| rank.doc_id.as_str()).collect();
        assert_eq!(order, vec!["X", "Y"]);
    }

    #[test]
    fn empty_and_duplicate_inputs() {
        assert!(fuse_rankings(&[], 60.0).is_empty());
        assert!(fuse_rankings(&[Vec::new(), Vec::new()], 60.0).is_empty());

        let fused = fuse_rankings(&[ids(&["A", "A", "B"])], 60.0);
        assert_eq!(fused.len(), 2);
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-12);
        assert!((fused[1].score - 1.0 / 63.0).abs() < 1e-12);
    }
}
