//! C5 — MatchEngine.
//!
//! Owns the before-needle batch (built once per run, per §4.5 of the
//! design) and runs the two-phase before/after gating pipeline per file
//! window. Backend-agnostic: callers supply a `search` closure so the same
//! gating logic drives both [`crate::search::cpu::CpuSearcher`] and
//! [`crate::search::gpu::GpuDriver`] without this module depending on
//! either directly (`GpuDriver::dispatch` needs `&mut self`, which a shared
//! `Searcher` reference here couldn't express).
//!
//! Grounded on `examples/original_source/cvematch.py`'s main loop
//! (`needles_before_map`/`needles_after_map` construction, `score_b`/
//! `score_a` averaging, and the `score_b < max_score and score_b < score_a`
//! gate) and `cvm/match.py`'s `CVEDesc.match_tokens`.

use crate::config::MatcherConfig;
use crate::embedding::EmbeddingTable;
use crate::error::CveScanError;
use crate::ingest::Window;
use crate::patch::CveDesc;
use crate::search::{CostModel, Needle, SearchResult, INVALID_INDEX};

/// Per-hunk detail attached to an emitted [`CveMatch`], per §4.5 step 7.
#[derive(Debug, Clone)]
pub struct HunkMatch {
    pub dist_b: f32,
    pub dist_a: f32,
    /// Global token offset (window offset already folded in) where the
    /// matched before-hunk starts.
    pub start_token: usize,
    pub display: String,
}

/// One gated-in CVE match for one file window.
#[derive(Debug, Clone)]
pub struct CveMatch {
    pub change_id: String,
    pub cve_id: Option<String>,
    pub cwe_id: Option<String>,
    pub score_b: f32,
    pub score_a: f32,
    pub window_offset: usize,
    pub hunks: Vec<HunkMatch>,
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let mut sum = 0.0f32;
    let mut n = 0usize;
    for v in values {
        sum += v;
        n += 1;
    }
    if n == 0 {
        0.0
    } else {
        sum / n as f32
    }
}

/// Clamp rounding noise per §4.5 step 6: `|x| < 1e-6` becomes exactly `0`.
fn clamp_near_zero(x: f32) -> f32 {
    if x.abs() < 1e-6 {
        0.0
    } else {
        x
    }
}

pub struct MatchEngine<'a> {
    embed: &'a EmbeddingTable,
    cves: &'a [CveDesc],
    costs: CostModel,
    max_score: f32,
    before_needles: Vec<Needle>,
    /// Per-cve indices into `before_needles`, parallel to `cves`.
    before_idx: Vec<Vec<usize>>,
}

impl<'a> MatchEngine<'a> {
    /// Build the before-needle batch once for the whole run.
    pub fn new(cves: &'a [CveDesc], embed: &'a EmbeddingTable, config: &MatcherConfig) -> Self {
        let mut before_needles = Vec::new();
        let mut before_idx = Vec::with_capacity(cves.len());
        for cve in cves {
            let mut idxs = Vec::with_capacity(cve.before.len());
            for hunk in &cve.before {
                idxs.push(before_needles.len());
                before_needles.push(hunk.tokens.iter().map(|t| embed.index(t)).collect());
            }
            before_idx.push(idxs);
        }
        MatchEngine {
            embed,
            cves,
            costs: CostModel {
                ins_cost: config.ins_cost,
                del_cost: config.del_cost,
            },
            max_score: config.max_score,
            before_needles,
            before_idx,
        }
    }

    pub fn costs(&self) -> CostModel {
        self.costs
    }

    /// The run-lifetime before-needle batch, built once and reused for
    /// every window of every file.
    pub fn before_needles(&self) -> &[Needle] {
        &self.before_needles
    }

    /// Run the before-search results for this window through the gating
    /// pipeline, building and searching the after-batch only for CVEs that
    /// survive the before-gate, and emit the final `CveMatch` list.
    ///
    /// `search` runs one batch of needles against this window's haystack on
    /// whichever backend the caller selected; it is called at most twice
    /// (it is not called at all a second time if no CVE survives the
    /// before-gate, per §4.5 step 4).
    pub fn scan_window(
        &self,
        window: &Window<'_>,
        search: &mut dyn FnMut(&[Needle]) -> Vec<SearchResult>,
    ) -> Result<Vec<CveMatch>, CveScanError> {
        if self.before_needles.is_empty() {
            return Ok(Vec::new());
        }
        let dist_b = search(&self.before_needles);

        let mut retained: Vec<(usize, f32)> = Vec::new();
        for (cve_idx, idxs) in self.before_idx.iter().enumerate() {
            if idxs.is_empty() {
                continue;
            }
            let score_b = mean(idxs.iter().map(|&i| dist_b[i].distance));
            if score_b < self.max_score {
                retained.push((cve_idx, score_b));
            }
        }
        if retained.is_empty() {
            return Ok(Vec::new());
        }

        let mut after_needles = Vec::new();
        let mut after_idx: Vec<Vec<usize>> = Vec::with_capacity(retained.len());
        for &(cve_idx, _) in &retained {
            let cve = &self.cves[cve_idx];
            let mut idxs = Vec::with_capacity(cve.after.len());
            for hunk in &cve.after {
                idxs.push(after_needles.len());
                after_needles.push(hunk.tokens.iter().map(|t| self.embed.index(t)).collect());
            }
            after_idx.push(idxs);
        }

        let dist_a_all = if after_needles.is_empty() {
            Vec::new()
        } else {
            search(&after_needles)
        };

        let mut matches = Vec::new();
        for (ri, &(cve_idx, score_b)) in retained.iter().enumerate() {
            let cve = &self.cves[cve_idx];
            let after_for_cve = &after_idx[ri];

            let score_a = if after_for_cve.is_empty() {
                1.0
            } else {
                mean(after_for_cve.iter().map(|&i| dist_a_all[i].distance))
            };

            let score_b = clamp_near_zero(score_b);
            let score_a = clamp_near_zero(score_a);
            if score_b < 0.0 || score_a < 0.0 {
                return Err(CveScanError::Invariant(format!(
                    "negative aggregate score for change '{}' (score_b={score_b}, score_a={score_a})",
                    cve.change_id
                )));
            }

            if score_b >= score_a {
                continue;
            }

            let before_for_cve = &self.before_idx[cve_idx];
            let mut hunks = Vec::with_capacity(before_for_cve.len());
            for (hi, &needle_i) in before_for_cve.iter().enumerate() {
                let hunk_len = cve.before[hi].tokens.len();
                let r = dist_b[needle_i];
                let end = (r.end_index as usize).min(window.tokens.len());
                let start = end.saturating_sub(hunk_len);
                if r.end_index < INVALID_INDEX
                    && hunk_len <= window.tokens.len()
                    && start + hunk_len > window.tokens.len()
                {
                    return Err(CveScanError::Invariant(format!(
                        "hunk window overrun for change '{}': start {start} + len {hunk_len} > window {}",
                        cve.change_id,
                        window.tokens.len()
                    )));
                }
                let dist_a_h = after_for_cve
                    .get(hi)
                    .map(|&ai| dist_a_all[ai].distance)
                    .unwrap_or(1.0);
                hunks.push(HunkMatch {
                    dist_b: r.distance,
                    dist_a: dist_a_h,
                    start_token: window.offset + start,
                    display: cve.before[hi].display.clone(),
                });
            }

            matches.push(CveMatch {
                change_id: cve.change_id.clone(),
                cve_id: cve.cve_id.clone(),
                cwe_id: cve.cwe_id.clone(),
                score_b,
                score_a,
                window_offset: window.offset,
                hunks,
            });
        }

        Ok(matches)
    }
}
