//! Mission audit artifacts under `<state_dir>/audits/`.
//!
//! Each mission writes `audit_<stamp>.json` (the immutable record), then
//! hashes those exact bytes with SHA-256 and renders `post_mortem_<stamp>.md`
//! from the same data. Both files are written with write-then-replace.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::core::invariants::validate_history;
use crate::core::types::{MissionStatus, StepRecord};
use crate::io::prompt::{ReportInput, render_report};
use crate::io::write_atomic;

/// Audit artifact file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub objective: String,
    pub timestamp: String,
    pub status: MissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub history: Vec<StepRecord>,
}

impl AuditRecord {
    pub fn new(
        objective: impl Into<String>,
        status: MissionStatus,
        summary: Option<String>,
        history: Vec<StepRecord>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            objective: objective.into(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            status,
            summary,
            history,
        }
    }

    /// Canonical bytes written to disk and hashed.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = serde_json::to_vec_pretty(self).context("serialize audit record")?;
        buf.push(b'\n');
        Ok(buf)
    }
}

/// Presentation details recorded in the report but not in the audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportMeta {
    pub mode: String,
    pub failed_over: bool,
    pub cycles: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditArtifacts {
    pub audit_path: PathBuf,
    pub report_path: PathBuf,
    /// Hex SHA-256 of the audit file bytes.
    pub hash: String,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn file_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// First stamp for `at` whose audit and report names are both free in `dir`.
fn unused_stamp(dir: &Path, at: DateTime<Utc>) -> String {
    let base = file_stamp(at);
    let taken = |stamp: &str| {
        dir.join(format!("audit_{stamp}.json")).exists()
            || dir.join(format!("post_mortem_{stamp}.md")).exists()
    };
    let mut stamp = base.clone();
    let mut n = 1u32;
    while taken(&stamp) {
        stamp = format!("{base}_{n}");
        n += 1;
    }
    stamp
}

/// Write the audit record and its post-mortem report into `dir`.
#[instrument(skip_all, fields(dir = %dir.display(), status = record.status.as_str()))]
pub fn write_audit(
    dir: &Path,
    record: &AuditRecord,
    meta: &ReportMeta,
    at: DateTime<Utc>,
) -> Result<AuditArtifacts> {
    fs::create_dir_all(dir).with_context(|| format!("create audit dir {}", dir.display()))?;
    let stamp = unused_stamp(dir, at);
    let audit_path = dir.join(format!("audit_{stamp}.json"));
    let report_path = dir.join(format!("post_mortem_{stamp}.md"));

    let bytes = record.to_bytes()?;
    write_atomic(&audit_path, &bytes)?;
    let hash = sha256_hex(&bytes);

    let audit_file = audit_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let report = render_report(&ReportInput {
        objective: &record.objective,
        status: record.status.as_str(),
        mode: &meta.mode,
        failed_over: meta.failed_over,
        timestamp: &record.timestamp,
        cycles: meta.cycles,
        audit_file: &audit_file,
        hash: &hash,
        summary: record.summary.as_deref(),
        steps: &record.history,
    })?;
    write_atomic(&report_path, report.as_bytes())?;

    info!(audit = %audit_path.display(), hash = %hash, "audit written");
    Ok(AuditArtifacts {
        audit_path,
        report_path,
        hash,
    })
}

/// Read an audit file, returning the record and the hash of its bytes.
pub fn load_audit(path: &Path) -> Result<(AuditRecord, String)> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let record: AuditRecord =
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    Ok((record, sha256_hex(&bytes)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub record: AuditRecord,
    pub hash: String,
}

/// Recompute the hash of an audit file and check its history invariants.
///
/// Fails when `expected_hash` is given and differs, or when the history is
/// malformed.
pub fn verify_audit(path: &Path, expected_hash: Option<&str>) -> Result<Verification> {
    let (record, hash) = load_audit(path)?;
    if let Some(expected) = expected_hash
        && !expected.trim().eq_ignore_ascii_case(&hash)
    {
        bail!(
            "hash mismatch for {}: expected {}, computed {hash}",
            path.display(),
            expected.trim()
        );
    }
    let errors = validate_history(&record.history);
    if !errors.is_empty() {
        bail!("history invariant violations:\n- {}", errors.join("\n- "));
    }
    Ok(Verification { record, hash })
}
