//! C4 — ApproxSearch.
//!
//! Token-weighted approximate substring search: for each needle in a batch,
//! find the haystack end-position minimizing a Levenshtein-style edit
//! distance whose substitution cost is the embedding's token distance.
//!
//! [`cpu::CpuSearcher`] is the sequential reference implementation — it
//! implements the [`Searcher`] trait and is the oracle every GPU result is
//! checked against, plus the automatic `--no-gpu` fallback.
//! [`gpu::GpuDriver`] dispatches one `wgpu` work item per needle against a
//! shared haystack, batching many needles per kernel launch; it exposes
//! `dispatch(&mut self, ...)` instead of `Searcher` because a dispatch
//! mutates its pooled device buffers (reused across calls per the resource
//! model), which the shared immutable-`&self` trait can't express.

pub mod cpu;
pub mod gpu;

/// Invalid-index marker reserved by the design: any `ind` at or above this
/// value means "no valid alignment" (used when `n < m`).
pub const INVALID_INDEX: u32 = 0xFFFF_FF00;

/// Edit-distance costs shared by both backends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub ins_cost: f32,
    pub del_cost: f32,
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel {
            ins_cost: 2.0,
            del_cost: 2.0,
        }
    }
}

/// One needle's packed token-index sequence.
pub type Needle = Vec<i32>;

/// Per-needle result: minimum distance and the one-past-end column index of
/// the best alignment (per the design's recurrence). `end_index` uses
/// [`INVALID_INDEX`]-or-above to signal "no match" when the needle is
/// longer than the haystack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub distance: f32,
    pub end_index: u32,
}

/// Large sentinel distance returned for a needle longer than the haystack
/// (`n < m`), per §4.4.
pub const NO_MATCH_DISTANCE: f32 = 1.0e6;

/// Shared contract for the two backends: run many needles against one
/// haystack of embedding-index tokens.
pub trait Searcher {
    fn search(
        &self,
        needles: &[Needle],
        haystack: &[i32],
        embed: &crate::embedding::EmbeddingTable,
        costs: CostModel,
    ) -> Vec<SearchResult>;
}
