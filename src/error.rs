//! Unified error type for the similarity engine and its CLI.

use thiserror::Error;

/// All errors that can surface from `cvescan`.
///
/// Variants map onto the error kinds of the design: `Config` covers a
/// missing embedding artifact, unreadable database, or invalid CLI
/// combination; `Parse` wraps a single malformed diff (recovered locally —
/// see [`crate::patch`]); `Device` covers GPU kernel build/launch/read
/// failures and is fatal for the run; `Invariant` marks a violated
/// assertion (negative score, oversized argmin) and is also fatal.
///
/// Tokenization never fails — invalid bytes are replaced before scanning —
/// so there is no `Tokenize` variant.
#[derive(Error, Debug)]
pub enum CveScanError {
    /// I/O error reading a source file, embedding artifact, or ignore-file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error opening or querying the CVE/CWE store.
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// Missing artifact, unreadable db, zero files, or an invalid flag
    /// combination caught before any matching work starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// A single unified diff failed to parse. The caller logs this and
    /// skips the offending diff; it is never propagated to `main`.
    #[error("failed to parse diff for change '{change_id}': {reason}")]
    Parse { change_id: String, reason: String },

    /// GPU kernel build, launch, or buffer read-back failure. Fatal.
    #[error("device error: {0}")]
    Device(String),

    /// A violated internal assertion (e.g. `dist_b < 0`, or an argmin index
    /// past the haystack). Indicates a bug, not a user error. Fatal.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl CveScanError {
    /// Exit code per the CLI contract: 1 for user error, 2 for device/IO error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CveScanError::Config(_) | CveScanError::Parse { .. } => 1,
            CveScanError::Io(_)
            | CveScanError::Db(_)
            | CveScanError::Device(_)
            | CveScanError::Invariant(_) => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_exit_code_is_one() {
        let err = CveScanError::Config("no embedding named w2v-x".into());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn device_error_exit_code_is_two() {
        let err = CveScanError::Device("kernel build failed".into());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn parse_error_display_includes_change_id() {
        let err = CveScanError::Parse {
            change_id: "CVE-2021-1234".into(),
            reason: "unexpected hunk header".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("CVE-2021-1234"));
        assert!(msg.contains("unexpected hunk header"));
    }

    #[test]
    fn invariant_error_display() {
        let err = CveScanError::Invariant("dist_b < 0".into());
        assert!(err.to_string().contains("dist_b < 0"));
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CveScanError = io_err.into();
        assert!(matches!(err, CveScanError::Io(_)));
    }
}
