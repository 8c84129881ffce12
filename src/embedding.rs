//! C2 — EmbeddingTable.
//!
//! A read-only token→vector mapping loaded from an on-disk artifact
//! (a directory with `vocab.tsv` and `vectors.f32`, mirroring the split
//! vocabulary/vectors layout a `gensim.KeyedVectors` save produces). Exposes
//! vocabulary lookup, row access, and pairwise cosine distance.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::CveScanError;

/// Sentinel for an out-of-vocabulary token.
pub const OOV: i32 = -1;

/// A 32-bit row index into the embedding matrix, or [`OOV`].
pub type TokenIndex = i32;

/// Immutable vocabulary + dense float matrix.
#[derive(Debug)]
pub struct EmbeddingTable {
    vocab: HashMap<String, u32>,
    vectors: Vec<f32>,
    dim: usize,
    vocab_size: usize,
    /// Returned for any pair involving an OOV token.
    default_distance: f32,
}

impl EmbeddingTable {
    /// Load from `dir/vocab.tsv` (one `token\tindex` per line) and
    /// `dir/vectors.f32` (row-major, little-endian float32, `vocab_size *
    /// dim` values). `dim` and `vocab_size` are discovered from the files,
    /// not hard-coded — callers recompile the search kernel to match.
    pub fn load(dir: &Path, default_distance: f32) -> Result<Self, CveScanError> {
        let vocab_path = dir.join("vocab.tsv");
        let vectors_path = dir.join("vectors.f32");

        let vocab_text = fs::read_to_string(&vocab_path).map_err(|e| {
            CveScanError::Config(format!(
                "cannot read vocabulary '{}': {e}",
                vocab_path.display()
            ))
        })?;

        let mut vocab = HashMap::new();
        let mut max_index = 0usize;
        for line in vocab_text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, '\t');
            let token = parts.next().unwrap_or_default().to_string();
            let idx: u32 = parts
                .next()
                .ok_or_else(|| CveScanError::Config(format!("malformed vocab line: {line}")))?
                .trim()
                .parse()
                .map_err(|_| CveScanError::Config(format!("malformed vocab index: {line}")))?;
            max_index = max_index.max(idx as usize + 1);
            vocab.insert(token, idx);
        }
        if vocab.is_empty() {
            return Err(CveScanError::Config(format!(
                "vocabulary at '{}' is empty",
                vocab_path.display()
            )));
        }

        let raw = fs::read(&vectors_path).map_err(|e| {
            CveScanError::Config(format!(
                "cannot read vectors '{}': {e}",
                vectors_path.display()
            ))
        })?;
        if raw.len() % 4 != 0 {
            return Err(CveScanError::Config(
                "vector matrix file length is not a multiple of 4 bytes".into(),
            ));
        }
        let total_f32 = raw.len() / 4;
        let vocab_size = max_index;
        if vocab_size == 0 || total_f32 % vocab_size != 0 {
            return Err(CveScanError::Config(format!(
                "vector matrix has {total_f32} floats, not divisible by vocab size {vocab_size}"
            )));
        }
        let dim = total_f32 / vocab_size;

        let mut vectors = Vec::with_capacity(total_f32);
        for chunk in raw.chunks_exact(4) {
            vectors.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }

        Ok(EmbeddingTable {
            vocab,
            vectors,
            dim,
            vocab_size,
            default_distance,
        })
    }

    /// Build directly from parts — used by tests and by callers that
    /// synthesize an embedding in memory instead of loading one from disk.
    pub fn from_parts(
        vocab: HashMap<String, u32>,
        vectors: Vec<f32>,
        dim: usize,
        default_distance: f32,
    ) -> Self {
        let vocab_size = vectors.len() / dim.max(1);
        EmbeddingTable {
            vocab,
            vectors,
            dim,
            vocab_size,
            default_distance,
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Look up a token's row index, or [`OOV`] if absent.
    pub fn index(&self, token: &str) -> TokenIndex {
        self.vocab.get(token).map(|&i| i as i32).unwrap_or(OOV)
    }

    /// View the `dim`-length row for a valid (non-OOV) index.
    pub fn vector(&self, idx: TokenIndex) -> Option<&[f32]> {
        if idx < 0 {
            return None;
        }
        let start = idx as usize * self.dim;
        self.vectors.get(start..start + self.dim)
    }

    /// Cosine distance `1 - cos(u, v)` between two rows, clamped to `[0,
    /// 2]`. Either index being [`OOV`] returns the configured default
    /// distance; equal indices return `0`.
    pub fn distance(&self, a: TokenIndex, b: TokenIndex) -> f32 {
        if a == b && a != OOV {
            return 0.0;
        }
        if a == OOV || b == OOV {
            return self.default_distance;
        }
        let (Some(u), Some(v)) = (self.vector(a), self.vector(b)) else {
            return self.default_distance;
        };
        let mut dot = 0.0f32;
        let mut nu = 0.0f32;
        let mut nv = 0.0f32;
        for i in 0..u.len() {
            dot += u[i] * v[i];
            nu += u[i] * u[i];
            nv += v[i] * v[i];
        }
        if nu == 0.0 || nv == 0.0 {
            return self.default_distance;
        }
        let cos = dot / (nu.sqrt() * nv.sqrt());
        let dist = 1.0 - cos;
        // clamp negative rounding noise to 0, and the theoretical max to 2.
        dist.clamp(0.0, 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> EmbeddingTable {
        let mut vocab = HashMap::new();
        vocab.insert("x".to_string(), 0);
        vocab.insert("y".to_string(), 1);
        vocab.insert("z".to_string(), 2);
        // x = (1,0), y pointing close to x, z orthogonal to x
        let vectors = vec![1.0, 0.0, 0.98, 0.2, 0.0, 1.0];
        EmbeddingTable::from_parts(vocab, vectors, 2, 1.0)
    }

    #[test]
    fn identical_index_is_zero_distance() {
        let t = table();
        let ix = t.index("x");
        assert_eq!(t.distance(ix, ix), 0.0);
    }

    #[test]
    fn oov_uses_default_distance() {
        let t = table();
        let ix = t.index("x");
        let oov = t.index("not_in_vocab");
        assert_eq!(oov, OOV);
        assert_eq!(t.distance(ix, oov), 1.0);
        assert_eq!(t.distance(oov, oov), 1.0);
    }

    #[test]
    fn orthogonal_vectors_have_distance_one() {
        let t = table();
        let ix = t.index("x");
        let iz = t.index("z");
        assert!((t.distance(ix, iz) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn similar_vectors_have_small_distance() {
        let t = table();
        let ix = t.index("x");
        let iy = t.index("y");
        let d = t.distance(ix, iy);
        assert!(d > 0.0 && d < 0.2, "unexpected distance {d}");
    }

    #[test]
    fn distance_is_clamped_to_non_negative() {
        let mut vocab = HashMap::new();
        vocab.insert("a".to_string(), 0);
        // a single vector compared to itself via two indices mapping to the
        // same row: cosine should be exactly 1.0 -> distance 0, never
        // negative due to float noise.
        let vectors = vec![0.001, 0.999];
        let t = EmbeddingTable::from_parts(vocab, vectors, 2, 1.0);
        let ia = t.index("a");
        assert_eq!(t.distance(ia, ia), 0.0);
    }

    #[test]
    fn vocab_size_and_dim_discovered_from_parts() {
        let t = table();
        assert_eq!(t.dim(), 2);
        assert_eq!(t.vocab_size(), 3);
    }
}
