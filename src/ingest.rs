//! C6 — FileIngest.
//!
//! Reads a source file with lenient decoding, tokenizes it once, and slices
//! the resulting embedding-index sequence into overlapping windows bounded
//! by `haystack_max`. Grounded on `examples/original_source/cvematch.py`'s
//! `files.append((fname, cvm.tokenize(f.read())))` loop, generalized with
//! the windowing `spec.md` §4.5 adds on top of the original single-haystack
//! behavior.

use std::fs;
use std::path::{Path, PathBuf};

use crate::embedding::EmbeddingTable;
use crate::error::CveScanError;
use crate::token::{tokenize, CLike, LineToken};

/// One file's memoized tokenization plus the embedding-index sequence the
/// search driver consumes.
#[derive(Debug, Clone)]
pub struct IngestedFile {
    pub path: PathBuf,
    pub line_tokens: Vec<LineToken>,
    pub indices: Vec<i32>,
}

/// A bounded slice of one file's token-index sequence, carrying the offset
/// needed to translate a match position back to a line number.
#[derive(Debug, Clone)]
pub struct Window<'a> {
    pub offset: usize,
    pub tokens: &'a [i32],
}

impl IngestedFile {
    /// Read and tokenize `path`. Invalid UTF-8 bytes are replaced, never
    /// fatal — only the file-open itself can fail.
    pub fn load(path: &Path, embed: &EmbeddingTable) -> Result<Self, CveScanError> {
        let raw = fs::read(path)?;
        let text = String::from_utf8_lossy(&raw).into_owned();
        let lexer = CLike::new();
        let line_tokens = tokenize(&text, &lexer);
        let indices = line_tokens.iter().map(|t| embed.index(&t.token)).collect();
        Ok(IngestedFile {
            path: path.to_path_buf(),
            line_tokens,
            indices,
        })
    }

    /// Source line (1-based) that produced the token at `index`, or the
    /// last known line if `index` runs past the end (defensive only — the
    /// engine never asks for an out-of-range index in practice).
    pub fn line_for(&self, index: usize) -> u32 {
        self.line_tokens
            .get(index)
            .map(|t| t.line)
            .or_else(|| self.line_tokens.last().map(|t| t.line))
            .unwrap_or(1)
    }

    /// Split the token-index sequence into windows of at most
    /// `haystack_max` tokens, each overlapping the previous by `overlap`
    /// (a fraction in `(0, 1)`). A file no longer than `haystack_max`
    /// yields exactly one window starting at offset 0.
    pub fn windows(&self, haystack_max: usize, overlap: f32) -> Vec<Window<'_>> {
        let n = self.indices.len();
        if n <= haystack_max {
            return vec![Window {
                offset: 0,
                tokens: &self.indices,
            }];
        }

        let step = ((haystack_max as f32) * (1.0 - overlap)).round() as usize;
        let step = step.max(1);

        let mut out = Vec::new();
        let mut start = 0usize;
        loop {
            let end = (start + haystack_max).min(n);
            out.push(Window {
                offset: start,
                tokens: &self.indices[start..end],
            });
            if end == n {
                break;
            }
            start += step;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn embed() -> EmbeddingTable {
        let mut vocab = HashMap::new();
        for (i, t) in ["int", "x", "=", "123", ";"].iter().enumerate() {
            vocab.insert(t.to_string(), i as u32);
        }
        let vectors = vec![0.0f32; 5 * 2];
        EmbeddingTable::from_parts(vocab, vectors, 2, 1.0)
    }

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn small_file_is_a_single_window() {
        let f = write_tmp("int x = 42;");
        let ing = IngestedFile::load(f.path(), &embed()).unwrap();
        let ws = ing.windows(100, 0.10);
        assert_eq!(ws.len(), 1);
        assert_eq!(ws[0].offset, 0);
        assert_eq!(ws[0].tokens.len(), ing.indices.len());
    }

    #[test]
    fn scenario_5_large_file_windows_with_overlap() {
        // 1.5 * haystack_max tokens -> 2 windows per the design.
        let body: String = (0..150).map(|_| "int ").collect();
        let f = write_tmp(&body);
        let ing = IngestedFile::load(f.path(), &embed()).unwrap();
        assert_eq!(ing.indices.len(), 150);
        let ws = ing.windows(100, 0.10);
        assert_eq!(ws.len(), 2);
        assert_eq!(ws[0].offset, 0);
        assert_eq!(ws[0].tokens.len(), 100);
        assert_eq!(ws[1].offset, 90);
        assert_eq!(ws[1].tokens.len(), 60);
        // last window always reaches the end of the file.
        assert_eq!(ws[1].offset + ws[1].tokens.len(), 150);
    }

    #[test]
    fn invalid_utf8_bytes_are_replaced_not_fatal() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        f.write_all(b"int x\xFF\xFE = 1;").unwrap();
        let result = IngestedFile::load(f.path(), &embed());
        assert!(result.is_ok());
    }
}
