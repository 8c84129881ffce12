//! C3 — PatchParser.
//!
//! Parses a unified diff into per-CVE `before`/`after` token sequences.
//! Grounded on `examples/original_source/cvm/match.py`'s `CVEDesc.from_patch`:
//! the same context/added/removed line classification and hunk-boundary
//! bookkeeping, re-expressed as a hand-rolled unified-diff scan (no
//! `unidiff`-equivalent crate is in the corpus' dependency stack, so this
//! mirrors the teacher's habit of hand-rolling format parsers — see its
//! `definitions::parser_*` modules).

use crate::token::{tokenize, CLike};

/// A contiguous token sequence from one side (before or after) of a hunk,
/// plus the display text used for `--report-diff`.
#[derive(Debug, Clone, PartialEq)]
pub struct CveHunk {
    pub tokens: Vec<String>,
    pub display: String,
}

/// Parsed representation of one CVE's patch: identifiers plus ordered
/// before/after hunks. `before` is always non-empty — see [`parse_diff`].
#[derive(Debug, Clone)]
pub struct CveDesc {
    pub change_id: String,
    pub cve_id: Option<String>,
    pub cwe_id: Option<String>,
    pub before: Vec<CveHunk>,
    pub after: Vec<CveHunk>,
}

impl CveDesc {
    pub fn before_len(&self) -> usize {
        self.before.iter().map(|h| h.tokens.len()).sum()
    }

    pub fn after_len(&self) -> usize {
        self.after.iter().map(|h| h.tokens.len()).sum()
    }
}

#[derive(Default)]
struct HunkAccum {
    before_tokens: Vec<String>,
    after_tokens: Vec<String>,
    display: String,
}

/// Parse one unified diff (possibly covering multiple files/hunks) into a
/// single [`CveDesc`] that pools all hunks across the diff, or `None` if no
/// hunk survives the `min_hunk_tokens` gate (an empty-before CveDesc is
/// discarded, per the design).
pub fn parse_diff(
    change_id: &str,
    cve_id: Option<&str>,
    cwe_id: Option<&str>,
    diff_text: &str,
    min_hunk_tokens: usize,
) -> Option<CveDesc> {
    let hunks = scan_hunks(diff_text);
    let mut before = Vec::new();
    let mut after = Vec::new();
    for h in hunks {
        if h.before_tokens.len() >= min_hunk_tokens {
            before.push(CveHunk {
                tokens: h.before_tokens,
                display: h.display.clone(),
            });
        }
        if h.after_tokens.len() >= min_hunk_tokens {
            after.push(CveHunk {
                tokens: h.after_tokens,
                display: h.display,
            });
        }
    }

    if before.is_empty() {
        return None;
    }

    Some(CveDesc {
        change_id: change_id.to_string(),
        cve_id: cve_id.map(|s| s.to_string()),
        cwe_id: cwe_id.map(|s| s.to_string()),
        before,
        after,
    })
}

/// Split-mode variant: one `CveDesc` per before-hunk, paired positionally
/// with the same-index after-hunk when present (per `--split-diffs`).
pub fn parse_diff_split(
    change_id: &str,
    cve_id: Option<&str>,
    cwe_id: Option<&str>,
    diff_text: &str,
    min_hunk_tokens: usize,
) -> Vec<CveDesc> {
    let hunks = scan_hunks(diff_text);
    let mut out = Vec::new();
    for (i, h) in hunks.iter().enumerate() {
        if h.before_tokens.len() < min_hunk_tokens {
            continue;
        }
        let before = vec![CveHunk {
            tokens: h.before_tokens.clone(),
            display: h.display.clone(),
        }];
        let after = if h.after_tokens.len() >= min_hunk_tokens {
            vec![CveHunk {
                tokens: h.after_tokens.clone(),
                display: h.display.clone(),
            }]
        } else {
            Vec::new()
        };
        out.push(CveDesc {
            change_id: format!("{change_id}#{i}"),
            cve_id: cve_id.map(|s| s.to_string()),
            cwe_id: cwe_id.map(|s| s.to_string()),
            before,
            after,
        });
    }
    out
}

/// Scan a unified diff text into per-hunk token accumulators. A hunk is the
/// contiguous run of `' '`/`'+'`/`'-'`-prefixed lines following an `@@ ...
/// @@` header; any other line (file headers, `diff --git`, etc.) ends the
/// current hunk without starting a new one.
fn scan_hunks(diff_text: &str) -> Vec<HunkAccum> {
    let mut hunks = Vec::new();
    let mut current: Option<HunkAccum> = None;
    let lexer = CLike::new();

    for raw_line in diff_text.split('\n') {
        if raw_line.starts_with("@@") {
            if let Some(h) = current.take() {
                hunks.push(h);
            }
            current = Some(HunkAccum::default());
            continue;
        }
        let Some(h) = current.as_mut() else {
            continue;
        };
        if raw_line.starts_with("diff --git") || raw_line.starts_with("--- ") || raw_line.starts_with("+++ ") {
            hunks.push(current.take().unwrap());
            continue;
        }
        if let Some(value) = raw_line.strip_prefix(' ') {
            let toks = line_tokens(value, &lexer);
            h.before_tokens.extend(toks.iter().cloned());
            h.after_tokens.extend(toks);
            h.display.push(' ');
            h.display.push_str(value);
            h.display.push('\n');
        } else if let Some(value) = raw_line.strip_prefix('+') {
            let toks = line_tokens(value, &lexer);
            h.after_tokens.extend(toks);
            h.display.push('+');
            h.display.push_str(value);
            h.display.push('\n');
        } else if let Some(value) = raw_line.strip_prefix('-') {
            let toks = line_tokens(value, &lexer);
            h.before_tokens.extend(toks);
            h.display.push('-');
            h.display.push_str(value);
            h.display.push('\n');
        } else if raw_line.is_empty() {
            // blank context line inside a hunk
            h.display.push('\n');
        } else {
            // Unrecognized line inside what we thought was a hunk body
            // (e.g. "\ No newline at end of file") ends the hunk.
            hunks.push(current.take().unwrap());
        }
    }
    if let Some(h) = current {
        hunks.push(h);
    }
    hunks
}

fn line_tokens(value: &str, lexer: &CLike) -> Vec<String> {
    tokenize(value, lexer).into_iter().map(|t| t.token).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_DIFF: &str = "diff --git a/foo.c b/foo.c\n--- a/foo.c\n+++ b/foo.c\n@@ -10,5 +10,5 @@ some_func(void)\n contextline();\n-badcall(a, b, c, d, e, f, g, h);\n+goodcall(a, b, c, d, e, f, g, h, guard);\n anothercontextcall(x, y, z);\n";

    #[test]
    fn parses_before_and_after_from_hunk() {
        let desc = parse_diff("CHG-1", Some("CVE-2020-0001"), None, SAMPLE_DIFF, 1).unwrap();
        assert_eq!(desc.before.len(), 1);
        assert_eq!(desc.after.len(), 1);
        assert!(desc.before[0].tokens.contains(&"badcall".to_string()));
        assert!(!desc.before[0].tokens.contains(&"goodcall".to_string()));
        assert!(desc.after[0].tokens.contains(&"goodcall".to_string()));
        assert!(desc.after[0].tokens.contains(&"contextline".to_string()));
    }

    #[test]
    fn scenario_4_min_hunk_tokens_gate() {
        // Two hunks: first has >=30 tokens via repeated removed identifiers,
        // second has only a handful. min_hunk_tokens=30 should drop hunk 2.
        let mut big_hunk_body = String::new();
        for _ in 0..40 {
            big_hunk_body.push_str("-removedtoken\n");
        }
        let diff = format!(
            "--- a/f.c\n+++ b/f.c\n@@ -1,40 +1,0 @@\n{big_hunk_body}@@ -50,2 +50,2 @@\n-a\n-b\n"
        );
        let desc = parse_diff("CHG-2", None, None, &diff, 30).unwrap();
        assert_eq!(desc.before.len(), 1);
        assert_eq!(desc.before[0].tokens.len(), 40);
    }

    #[test]
    fn empty_before_is_discarded() {
        // Only additions, no removed/context lines -> before is empty.
        let diff = "--- a/f.c\n+++ b/f.c\n@@ -1,0 +1,3 @@\n+a\n+b\n+c\n";
        assert!(parse_diff("CHG-3", None, None, diff, 1).is_none());
    }

    #[test]
    fn scenario_6_empty_after_hunks_list() {
        // A hunk entirely removed lines, nothing added: after list is empty
        // for this CVE even though before is non-empty.
        let diff = "--- a/f.c\n+++ b/f.c\n@@ -1,3 +1,0 @@\n-a\n-b\n-c\n";
        let desc = parse_diff("CHG-4", None, None, diff, 1).unwrap();
        assert_eq!(desc.before.len(), 1);
        assert!(desc.after.is_empty());
    }

    #[test]
    fn split_mode_pairs_hunks_positionally() {
        let diff = "--- a/f.c\n+++ b/f.c\n@@ -1,2 +1,2 @@\n-oldone\n+newone\n@@ -10,2 +10,2 @@\n-oldtwo\n+newtwo\n";
        let descs = parse_diff_split("CHG-5", None, None, diff, 1);
        assert_eq!(descs.len(), 2);
        assert_eq!(descs[0].before[0].tokens, vec!["oldone"]);
        assert_eq!(descs[0].after[0].tokens, vec!["newone"]);
        assert_eq!(descs[1].before[0].tokens, vec!["oldtwo"]);
        assert_eq!(descs[1].after[0].tokens, vec!["newtwo"]);
    }
}
