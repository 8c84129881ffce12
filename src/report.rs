//! Match report formatting. Grounded on `examples/original_source/cvematch.py`'s
//! `print` calls (`cve_show`, `cwe_show`, `w2v_show`, and the per-match
//! block in the `with` loop) — same line shapes, re-expressed with
//! `std::io::Write` instead of stdout prints so callers can redirect
//! output in tests.

use std::io::{self, Write};

use crate::db::{CveListEntry, CweListEntry, CveReport};
use crate::embedding::EmbeddingTable;
use crate::engine::CveMatch;
use crate::ingest::IngestedFile;

/// Which optional report sections `--report-*` flags requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportFlags {
    pub cve_info: bool,
    pub cwe: bool,
    pub diff: bool,
    pub diff_full: bool,
    pub diff_id: bool,
}

/// Render one `CveMatch` per §6's report format:
/// `"Matched {cve_id} with score {dist_b:.6f} - {dist_a:.6f}"`, optional
/// sections, then per-hunk line pointers
/// `{fname}:{line}:0   {dist_b:.6f} - {dist_a:.6f}`.
pub fn write_match(
    out: &mut impl Write,
    m: &CveMatch,
    file: &IngestedFile,
    db_report: Option<&CveReport>,
    flags: ReportFlags,
) -> io::Result<()> {
    let label = m.cve_id.as_deref().unwrap_or(&m.change_id);
    writeln!(out, "Matched {label} with score {:.6} - {:.6}", m.score_b, m.score_a)?;

    if flags.diff_id {
        writeln!(out, "change id: {}", m.change_id)?;
    }
    if flags.cve_info {
        if let Some(r) = db_report {
            writeln!(out, "CVE Info: {}", r.description)?;
        }
    }
    if flags.cwe {
        if let Some(r) = db_report {
            for c in &r.cwes {
                writeln!(out, "{} - {}", c.cwe_id, c.cwe_name)?;
            }
        } else if let Some(cwe_id) = &m.cwe_id {
            writeln!(out, "{cwe_id}")?;
        }
    }
    if flags.diff_full {
        if let Some(r) = db_report {
            writeln!(out, "diff:")?;
            writeln!(out, "{}", r.diff)?;
        }
    }

    for h in &m.hunks {
        let line = file.line_for(h.start_token);
        writeln!(
            out,
            "{}:{}:0   {:.6} - {:.6}",
            file.path.display(),
            line,
            h.dist_b,
            h.dist_a
        )?;
        if flags.diff {
            write!(out, "{}", h.display)?;
        }
    }
    writeln!(out)
}

/// `--cve-list`: one block per CVE, `cve_id cwe_id` then the description.
pub fn write_cve_list(out: &mut impl Write, entries: &[CveListEntry]) -> io::Result<()> {
    for e in entries {
        writeln!(out, "{} {}", e.cve_id, e.cwe_id.as_deref().unwrap_or(""))?;
        writeln!(out, "{}\n", e.description.trim_matches('"'))?;
    }
    Ok(())
}

/// `--cwe-list`: one block per CWE, name, description, and CVE count.
pub fn write_cwe_list(out: &mut impl Write, entries: &[CweListEntry]) -> io::Result<()> {
    for e in entries {
        writeln!(out, "{} - {}", e.cwe_id, e.cwe_name)?;
        writeln!(out, "{}", e.description.trim_matches('"'))?;
        writeln!(out, "CVEs with this CWE: {}\n", e.cve_count)?;
    }
    Ok(())
}

/// `--w2v-show`: sanity-check a handful of illustrative token pairs.
pub fn write_w2v_show(out: &mut impl Write, embed: &EmbeddingTable) -> io::Result<()> {
    writeln!(out, "word2vec distances")?;
    writeln!(out, "Should be close:")?;
    for (a, b) in [("+", "-"), ("if", "while"), ("int", "unsigned"), ("int", "uint")] {
        let d = embed.distance(embed.index(a), embed.index(b));
        writeln!(out, "{a} {b} : {d}")?;
    }
    writeln!(out, "Should be far:")?;
    for (a, b) in [("if", "/"), ("int", "while"), ("int", "&&"), ("int", ";")] {
        let d = embed.distance(embed.index(a), embed.index(b));
        writeln!(out, "{a} - {b} : {d}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HunkMatch;
    use std::collections::HashMap;

    fn embed() -> EmbeddingTable {
        let mut vocab = HashMap::new();
        vocab.insert("int".to_string(), 0);
        vocab.insert("unsigned".to_string(), 1);
        let vectors = vec![1.0, 0.0, 0.9, 0.1];
        EmbeddingTable::from_parts(vocab, vectors, 2, 1.0)
    }

    fn sample_match() -> CveMatch {
        CveMatch {
            change_id: "CHG-1".into(),
            cve_id: Some("CVE-2020-0001".into()),
            cwe_id: Some("CWE-119".into()),
            score_b: 0.1,
            score_a: 0.9,
            window_offset: 0,
            hunks: vec![HunkMatch {
                dist_b: 0.1,
                dist_a: 0.9,
                start_token: 2,
                display: "-bad_call(a);\n".into(),
            }],
        }
    }

    fn sample_file() -> IngestedFile {
        use crate::token::LineToken;
        IngestedFile {
            path: "foo.c".into(),
            line_tokens: vec![
                LineToken { line: 1, token: "a".into() },
                LineToken { line: 1, token: "b".into() },
                LineToken { line: 2, token: "bad_call".into() },
            ],
            indices: vec![0, 0, 0],
        }
    }

    #[test]
    fn match_header_line_uses_cve_id_and_scores() {
        let mut buf = Vec::new();
        write_match(&mut buf, &sample_match(), &sample_file(), None, ReportFlags::default()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Matched CVE-2020-0001 with score 0.100000 - 0.900000\n"));
    }

    #[test]
    fn line_pointer_resolves_line_from_start_token() {
        let mut buf = Vec::new();
        write_match(&mut buf, &sample_match(), &sample_file(), None, ReportFlags::default()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("foo.c:2:0   0.100000 - 0.900000"));
    }

    #[test]
    fn diff_flag_includes_hunk_display() {
        let mut buf = Vec::new();
        let flags = ReportFlags { diff: true, ..Default::default() };
        write_match(&mut buf, &sample_match(), &sample_file(), None, flags).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("-bad_call(a);"));
    }

    #[test]
    fn w2v_show_includes_close_and_far_sections() {
        let mut buf = Vec::new();
        write_w2v_show(&mut buf, &embed()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Should be close:"));
        assert!(text.contains("Should be far:"));
    }

    #[test]
    fn cve_list_strips_quoted_description() {
        let mut buf = Vec::new();
        let entries = vec![CveListEntry {
            cve_id: "CVE-1".into(),
            cwe_id: Some("CWE-1".into()),
            description: "\"quoted text\"".into(),
        }];
        write_cve_list(&mut buf, &entries).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("quoted text"));
        assert!(!text.contains("\"quoted text\""));
    }
}
