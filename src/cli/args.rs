//! CLI argument surface, kept for parity with the legacy `cvematch.py`
//! invocation shape (see `examples/original_source/cvematch.py`).

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "cvescan",
    version,
    about = "Match known CVE fixes against your source code",
    long_about = "Scans C-family source files for code structurally resembling the \
pre-fix state of known CVE patches. A match is a heuristic: \"this code loosely \
reminds of the code that led to CVE-X\", not a proof of vulnerability.",
    after_help = "EXAMPLE:\n  cvescan --report-diff --cve CVE-1999-0199 --max-score 0.3 some/project/src/*.c"
)]
pub struct Cli {
    /// Path to the CVE/CWE SQLite database. Defaults to a `data/CVEfixes_*.sqlite`
    /// found next to the binary.
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// word2vec embedding artifact name, see `--w2v-list`.
    #[arg(long, default_value = "w2v-cbow-v128-w5")]
    pub w2v: String,

    /// List available embedding artifacts and exit.
    #[arg(long)]
    pub w2v_list: bool,

    /// Print distances between a few illustrative token pairs and exit.
    #[arg(long)]
    pub w2v_show: bool,

    /// CVE id to check. Repeatable.
    #[arg(long = "cve", action = clap::ArgAction::Append)]
    pub cve: Vec<String>,

    /// Check all CVEs tagged with this CWE id. Repeatable.
    #[arg(long = "cwe", action = clap::ArgAction::Append)]
    pub cwe: Vec<String>,

    /// CVE id to exclude from the `--cve`/`--cwe` selection. Repeatable.
    #[arg(long = "no-cve", action = clap::ArgAction::Append)]
    pub no_cve: Vec<String>,

    /// Print the list of available CVEs and exit.
    #[arg(long)]
    pub cve_list: bool,

    /// Print the list of available CWEs and exit.
    #[arg(long)]
    pub cwe_list: bool,

    /// On match, print the CVE's textual description.
    #[arg(long)]
    pub report_cve_info: bool,

    /// On match, print the CWE id(s) and description(s) for the CVE.
    #[arg(long)]
    pub report_cwe: bool,

    /// On match, print the diff of the specific hunk that matched.
    #[arg(long)]
    pub report_diff: bool,

    /// On match, print the CVE's full fix diff.
    #[arg(long)]
    pub report_diff_full: bool,

    /// On match, print the underlying database change id alongside the CVE id.
    #[arg(long)]
    pub report_diff_id: bool,

    /// CVE id to never consider, even if selected by `--cve`/`--cwe`. Repeatable.
    #[arg(long = "ignore", action = clap::ArgAction::Append)]
    pub ignore: Vec<String>,

    /// File of newline-separated CVE ids to ignore, merged with `--ignore`.
    #[arg(long)]
    pub ignore_file: Option<PathBuf>,

    /// Split each diff into one CveDesc per hunk instead of pooling hunks
    /// per CVE.
    #[arg(long)]
    pub split_diffs: bool,

    /// Minimum token count for a hunk to be kept.
    #[arg(long, default_value_t = 30)]
    pub min_hunk_tokens: usize,

    /// Admission threshold on the before-fix average distance. Reasonable
    /// values range 0.05 (near-exact copy) to 0.3 (loose resemblance).
    #[arg(long, default_value_t = 0.2)]
    pub max_score: f32,

    /// Insertion cost in the Levenshtein-style distance computation.
    #[arg(long, default_value_t = 2.0)]
    pub levenstein_ins_cost: f32,

    /// Deletion cost in the Levenshtein-style distance computation.
    #[arg(long, default_value_t = 2.0)]
    pub levenstein_del_cost: f32,

    /// Upper bound on haystack tokens fed to one kernel dispatch; longer
    /// files are cut into overlapping windows.
    #[arg(long, default_value_t = 4096)]
    pub haystack_max: usize,

    /// Never use the GPU batch driver, always run the CPU reference search.
    #[arg(long)]
    pub no_gpu: bool,

    /// Log level for stderr diagnostics (error, warn, info, debug, trace).
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Source files to check.
    pub files: Vec<PathBuf>,
}
