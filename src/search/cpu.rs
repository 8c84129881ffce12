//! Sequential reference implementation of the DP core.
//!
//! Ported from `examples/original_source/cvm/measure.py`'s
//! `LevensteinSearch.distance`: a two-row Levenshtein recurrence where row 0
//! of each needle-row is reset to `0` (free prefix — the needle may start
//! anywhere in the haystack) and substitution cost is the embedding
//! distance instead of a fixed `1`. This is the oracle every GPU result is
//! checked against, and the only backend exercised by `--no-gpu` runs or
//! batches too small to justify a dispatch.

use crate::embedding::EmbeddingTable;
use crate::search::{CostModel, Needle, SearchResult, Searcher, NO_MATCH_DISTANCE};

/// CPU backend: one needle at a time, two-row DP.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuSearcher;

impl Searcher for CpuSearcher {
    fn search(
        &self,
        needles: &[Needle],
        haystack: &[i32],
        embed: &EmbeddingTable,
        costs: CostModel,
    ) -> Vec<SearchResult> {
        needles
            .iter()
            .map(|needle| search_one(needle, haystack, embed, costs))
            .collect()
    }
}

/// Run the DP recurrence for a single needle against the haystack.
///
/// ```text
/// v1[0] = 0                                    // free prefix
/// v1[j] = min(
///   v0[j]   + del_cost,
///   v1[j-1] + ins_cost,
///   v0[j-1] + token_distance(needle[i], haystack[j]),
/// )
/// ```
/// The answer is `min_j v_m[j]`; `end_index` is the argmin `j` (one-past-end
/// of the matched window).
pub fn search_one(
    needle: &[i32],
    haystack: &[i32],
    embed: &EmbeddingTable,
    costs: CostModel,
) -> SearchResult {
    let m = needle.len();
    let n = haystack.len();
    if n < m {
        return SearchResult {
            distance: NO_MATCH_DISTANCE,
            end_index: m as u32,
        };
    }
    if m == 0 {
        return SearchResult {
            distance: 0.0,
            end_index: 0,
        };
    }

    let mut v0 = vec![0.0f32; n + 1];
    let mut v1 = vec![0.0f32; n + 1];

    for i in 0..m {
        v1[0] = 0.0; // free prefix: reset every row, not i+1 as classic Levenshtein would.
        for j in 0..n {
            let del = v0[j + 1] + costs.del_cost;
            let ins = v1[j] + costs.ins_cost;
            let sub = v0[j] + embed.distance(needle[i], haystack[j]);
            v1[j + 1] = del.min(ins).min(sub);
        }
        std::mem::swap(&mut v0, &mut v1);
    }

    let (end_index, distance) = v0
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(idx, &d)| (idx as u32, d))
        .unwrap_or((m as u32, NO_MATCH_DISTANCE));

    SearchResult {
        distance,
        end_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn embed_with(tokens: &[&str], oov_default: f32) -> (EmbeddingTable, HashMap<String, i32>) {
        let mut vocab = HashMap::new();
        let mut vectors = Vec::new();
        for (i, t) in tokens.iter().enumerate() {
            vocab.insert(t.to_string(), i as u32);
            // orthogonal one-hot rows in a `tokens.len()`-dim space so
            // distinct tokens have cosine distance 1.0 from each other.
            let mut row = vec![0.0f32; tokens.len()];
            row[i] = 1.0;
            vectors.extend(row);
        }
        let dim = tokens.len();
        let table = EmbeddingTable::from_parts(vocab.clone(), vectors, dim, oov_default);
        let idx = vocab.into_iter().map(|(k, v)| (k, v as i32)).collect();
        (table, idx)
    }

    #[test]
    fn scenario_2_verbatim_occurrence_zero_distance() {
        let (embed, idx) = embed_with(&["a", "b", "int", "x", ";", "c"], 1.0);
        let needle = vec![idx["int"], idx["x"], idx[";"]];
        let haystack = vec![idx["a"], idx["b"], idx["int"], idx["x"], idx[";"], idx["c"]];
        let r = search_one(&needle, &haystack, &embed, CostModel { ins_cost: 2.0, del_cost: 2.0 });
        assert_eq!(r.distance, 0.0);
        assert_eq!(r.end_index, 5);
    }

    #[test]
    fn scenario_3_partial_substitution_distance() {
        // needle ["int","x",";"], haystack ["int","y",";"], distance(x,y)=0.4
        let mut vocab = HashMap::new();
        vocab.insert("int".to_string(), 0);
        vocab.insert("x".to_string(), 1);
        vocab.insert(";".to_string(), 2);
        vocab.insert("y".to_string(), 3);
        // Construct vectors such that cosine distance(x, y) == 0.4 exactly:
        // use 2D unit vectors at an angle whose cosine is 0.6.
        let vectors = vec![
            1.0, 0.0, // int
            1.0, 0.0, // x  (reused axis; x vs y angle controlled below)
            0.0, 1.0, // ;
            0.6, 0.8, // y: cos(x,y) = 0.6 -> distance 0.4
        ];
        let embed = EmbeddingTable::from_parts(vocab.clone(), vectors, 2, 1.0);
        let needle = vec![0, 1, 2];
        let haystack = vec![0, 3, 2];
        let r = search_one(&needle, &haystack, &embed, CostModel { ins_cost: 2.0, del_cost: 2.0 });
        assert!((r.distance - 0.4).abs() < 1e-5, "got {}", r.distance);
        assert_eq!(r.end_index, 3);
    }

    #[test]
    fn needle_longer_than_haystack_is_non_match() {
        let (embed, idx) = embed_with(&["a", "b"], 1.0);
        let needle = vec![idx["a"], idx["b"], idx["a"]];
        let haystack = vec![idx["a"], idx["b"]];
        let r = search_one(&needle, &haystack, &embed, CostModel::default());
        assert_eq!(r.distance, NO_MATCH_DISTANCE);
        assert_eq!(r.end_index, 3);
    }

    #[test]
    fn free_prefix_and_suffix_never_increase_distance_when_needle_embedded() {
        let (embed, idx) = embed_with(&["p", "q", "r", "s"], 1.0);
        let needle = vec![idx["q"], idx["r"]];
        let bare = vec![idx["q"], idx["r"]];
        let padded = vec![idx["p"], idx["q"], idx["r"], idx["s"]];
        let costs = CostModel::default();
        let d_bare = search_one(&needle, &bare, &embed, costs).distance;
        let d_padded = search_one(&needle, &padded, &embed, costs).distance;
        assert!(d_padded <= d_bare + 1e-6);
        assert_eq!(d_bare, 0.0);
        assert_eq!(d_padded, 0.0);
    }

    #[test]
    fn oov_neutrality_within_insertion_cost_slack() {
        let (embed, idx) = embed_with(&["a", "b", "c"], 1.0);
        let needle = vec![idx["a"], idx["b"]];
        let haystack = vec![idx["a"], idx["b"], idx["c"]];
        let costs = CostModel::default();
        let base = search_one(&needle, &haystack, &embed, costs).distance;

        // Replace "b" by an OOV token index in both needle and haystack.
        let oov_needle = vec![idx["a"], -1];
        let oov_haystack = vec![idx["a"], -1, idx["c"]];
        let both_oov = search_one(&oov_needle, &oov_haystack, &embed, costs).distance;
        assert!((both_oov - base).abs() <= (costs.ins_cost - 1.0).abs() + 1e-6);
    }

    #[test]
    fn empty_needle_matches_with_zero_distance() {
        let (embed, idx) = embed_with(&["a"], 1.0);
        let haystack = vec![idx["a"]];
        let r = search_one(&[], &haystack, &embed, CostModel::default());
        assert_eq!(r.distance, 0.0);
        assert_eq!(r.end_index, 0);
    }
}
