//! Ambient configuration layer: CLI args validated into one immutable
//! [`MatcherConfig`] before any matching work starts, per the design's
//! "fail fast on configuration" propagation policy.

use crate::cli::args::Cli;
use crate::error::CveScanError;

/// Fixed window overlap fraction — not user-tunable, per §4.5 of the design.
pub const WINDOW_OVERLAP: f32 = 0.10;

/// Resolved, validated settings for one run of the matcher.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub max_score: f32,
    pub min_hunk_tokens: usize,
    pub ins_cost: f32,
    pub del_cost: f32,
    pub default_distance: f32,
    pub haystack_max: usize,
    pub window_overlap: f32,
    pub use_gpu: bool,
    pub split_diffs: bool,
}

impl MatcherConfig {
    /// Build from parsed CLI args, validating ranges before any file or
    /// database is touched. A `Config` error here is a user error (exit 1).
    pub fn from_args(cli: &Cli) -> Result<Self, CveScanError> {
        let max_score = cli.max_score;
        if !(0.0..=2.0).contains(&max_score) {
            return Err(CveScanError::Config(format!(
                "--max-score {max_score} out of range 0.0..=2.0 (cosine distance is bounded by 2)"
            )));
        }
        if cli.min_hunk_tokens == 0 {
            return Err(CveScanError::Config(
                "--min-hunk-tokens must be at least 1".into(),
            ));
        }
        if cli.levenstein_ins_cost < 0.0 || cli.levenstein_del_cost < 0.0 {
            return Err(CveScanError::Config(
                "--levenstein-ins-cost and --levenstein-del-cost must be non-negative".into(),
            ));
        }
        if cli.haystack_max < cli.min_hunk_tokens {
            return Err(CveScanError::Config(format!(
                "--haystack-max ({}) must be at least --min-hunk-tokens ({})",
                cli.haystack_max, cli.min_hunk_tokens
            )));
        }

        Ok(MatcherConfig {
            max_score,
            min_hunk_tokens: cli.min_hunk_tokens,
            ins_cost: cli.levenstein_ins_cost,
            del_cost: cli.levenstein_del_cost,
            default_distance: 1.0,
            haystack_max: cli.haystack_max,
            window_overlap: WINDOW_OVERLAP,
            use_gpu: !cli.no_gpu,
            split_diffs: cli.split_diffs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli_with(args: &[&str]) -> Cli {
        let mut full = vec!["cvescan"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn defaults_are_valid() {
        let cli = cli_with(&["f.c"]);
        let cfg = MatcherConfig::from_args(&cli).unwrap();
        assert_eq!(cfg.max_score, 0.2);
        assert_eq!(cfg.min_hunk_tokens, 30);
        assert_eq!(cfg.ins_cost, 2.0);
        assert_eq!(cfg.del_cost, 2.0);
        assert_eq!(cfg.window_overlap, WINDOW_OVERLAP);
    }

    #[test]
    fn rejects_out_of_range_max_score() {
        let cli = cli_with(&["--max-score", "5.0", "f.c"]);
        assert!(MatcherConfig::from_args(&cli).is_err());
    }

    #[test]
    fn rejects_zero_min_hunk_tokens() {
        let cli = cli_with(&["--min-hunk-tokens", "0", "f.c"]);
        assert!(MatcherConfig::from_args(&cli).is_err());
    }

    #[test]
    fn rejects_haystack_max_below_min_hunk_tokens() {
        let cli = cli_with(&["--haystack-max", "10", "--min-hunk-tokens", "30", "f.c"]);
        assert!(MatcherConfig::from_args(&cli).is_err());
    }
}
