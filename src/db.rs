//! Read-only access to the CVEfixes-shaped relational store.
//!
//! Grounded on `examples/original_source/cvm/db.py`'s `Database` class: the
//! same six read-only queries (list CVEs, list CWEs, fetch changes by CVE
//! id, fetch all changes for a language, CWE-for-CVE, per-change CVE
//! report), re-expressed as parameterized `rusqlite` statements against the
//! public CVEfixes schema (`cve`, `cwe`, `cwe_classification`, `fixes`,
//! `commits`, `file_change`) instead of hand-loaded `.sql` files. No schema
//! is created or migrated here.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use crate::error::CveScanError;

/// One file-level diff tied to a fix commit.
#[derive(Debug, Clone)]
pub struct FileChange {
    pub file_change_id: String,
    pub diff: String,
}

#[derive(Debug, Clone)]
pub struct CweInfo {
    pub cwe_id: String,
    pub cwe_name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct CveListEntry {
    pub cve_id: String,
    pub cwe_id: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct CweListEntry {
    pub cwe_id: String,
    pub cwe_name: String,
    pub cve_count: i64,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct CveReport {
    pub cve_id: String,
    pub description: String,
    pub diff: String,
    pub cwes: Vec<CweInfo>,
}

/// An open read-only connection to the CVE/CWE database.
pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: &Path) -> Result<Self, CveScanError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| {
                CveScanError::Config(format!("cannot open database '{}': {e}", path.display()))
            })?;
        Ok(Db { conn })
    }

    pub fn list_cves(&self) -> Result<Vec<CveListEntry>, CveScanError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.cve_id, cc.cwe_id, c.description
             FROM cve c
             LEFT JOIN cwe_classification cc ON cc.cve_id = c.cve_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CveListEntry {
                cve_id: row.get(0)?,
                cwe_id: row.get(1)?,
                description: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_cwes(&self) -> Result<Vec<CweListEntry>, CveScanError> {
        let mut stmt = self.conn.prepare(
            "SELECT w.cwe_id, w.cwe_name, COUNT(cc.cve_id), w.description
             FROM cwe w
             LEFT JOIN cwe_classification cc ON cc.cwe_id = w.cwe_id
             GROUP BY w.cwe_id, w.cwe_name, w.description",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CweListEntry {
                cwe_id: row.get(0)?,
                cwe_name: row.get(1)?,
                cve_count: row.get(2)?,
                description: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All CVE ids carrying the given CWE id.
    pub fn cves_by_cwe(&self, cwe_id: &str) -> Result<Vec<String>, CveScanError> {
        let mut stmt = self
            .conn
            .prepare("SELECT cve_id FROM cwe_classification WHERE cwe_id = ?1")?;
        let rows = stmt.query_map([cwe_id], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// File-level diffs for every fix commit of one CVE, restricted to C/C++.
    pub fn changes_for_cve(&self, cve_id: &str) -> Result<Vec<FileChange>, CveScanError> {
        let mut stmt = self.conn.prepare(
            "SELECT fc.file_change_id, fc.diff
             FROM fixes f
             JOIN commits cm ON cm.hash = f.hash
             JOIN file_change fc ON fc.hash = cm.hash
             WHERE f.cve_id = ?1 AND fc.programming_language IN ('C', 'C++')",
        )?;
        let rows = stmt.query_map([cve_id], |row| {
            Ok(FileChange {
                file_change_id: row.get(0)?,
                diff: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// File-level diffs for every fix commit in the whole database tagged
    /// with `lang`. `"C++"` also pulls in `"C"` rows, matching the legacy
    /// query's union behavior.
    pub fn changes_for_language(&self, lang: &str) -> Result<Vec<FileChange>, CveScanError> {
        let mut stmt = self.conn.prepare(
            "SELECT fc.file_change_id, fc.diff
             FROM fixes f
             JOIN commits cm ON cm.hash = f.hash
             JOIN file_change fc ON fc.hash = cm.hash
             WHERE fc.programming_language = ?1",
        )?;
        let mut out = Vec::new();
        for l in std::iter::once(lang).chain((lang == "C++").then_some("C")) {
            let rows = stmt.query_map([l], |row| {
                Ok(FileChange {
                    file_change_id: row.get(0)?,
                    diff: row.get(1)?,
                })
            })?;
            out.extend(rows.collect::<Result<Vec<_>, _>>()?);
        }
        Ok(out)
    }

    pub fn cwes_for_cve(&self, cve_id: &str) -> Result<Vec<CweInfo>, CveScanError> {
        let mut stmt = self.conn.prepare(
            "SELECT w.cwe_id, w.cwe_name, w.description
             FROM cwe_classification cc
             JOIN cwe w ON w.cwe_id = cc.cwe_id
             WHERE cc.cve_id = ?1",
        )?;
        let rows = stmt.query_map([cve_id], |row| {
            Ok(CweInfo {
                cwe_id: row.get(0)?,
                cwe_name: row.get(1)?,
                description: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Resolve a file-change id back to its owning CVE, description, full
    /// fix diff, and CWE classifications — the data `--report-*` flags need.
    pub fn cve_report(&self, file_change_id: &str) -> Result<Option<CveReport>, CveScanError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.cve_id, c.description, fc.diff
             FROM file_change fc
             JOIN commits cm ON cm.hash = fc.hash
             JOIN fixes f ON f.hash = cm.hash
             JOIN cve c ON c.cve_id = f.cve_id
             WHERE fc.file_change_id = ?1",
        )?;
        let mut rows = stmt.query_map([file_change_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let Some(row) = rows.next() else {
            return Ok(None);
        };
        let (cve_id, description, diff) = row?;
        let cwes = self.cwes_for_cve(&cve_id)?;
        Ok(Some(CveReport {
            cve_id,
            description,
            diff,
            cwes,
        }))
    }
}
