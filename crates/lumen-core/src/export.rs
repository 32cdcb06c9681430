//! Report export to a JSON artifact on disk.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::report::AuditReport;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("create export dir failed: {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialize report failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("write report failed: {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Artifact file name for a report, stamped with its audit time (UTC).
pub fn artifact_name(report: &AuditReport) -> String {
    format!(
        "lumen-report-{}.json",
        report.audited_at.format("%Y%m%dT%H%M%SZ")
    )
}

/// Write `report` as pretty JSON under `dir`, creating `dir` if missing.
///
/// Returns the path of the written artifact.
pub fn export(report: &AuditReport, dir: &Path) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir).map_err(|source| ExportError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(artifact_name(report));
    let mut json = serde_json::to_string_pretty(report)?;
    json.push('\n');

    fs::write(&path, json).map_err(|source| ExportError::Write {
        path: path.clone(),
        source,
    })?;

    tracing::info!(path = %path.display(), url = %report.url, "report exported");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ReportAggregator, RulesetOutcome};
    use crate::types::EvaluatorId;

    fn report() -> AuditReport {
        ReportAggregator::new().aggregate(
            "https://example.com",
            &[EvaluatorId::Label],
            vec![],
            RulesetOutcome::NotRun,
            None,
        )
    }

    #[test]
    fn test_artifact_name_is_timestamped() {
        let report = report();
        let name = artifact_name(&report);
        assert!(name.starts_with("lumen-report-"));
        assert!(name.ends_with("Z.json"));
        assert_eq!(name.len(), "lumen-report-20260101T000000Z.json".len());
    }

    #[test]
    fn test_export_creates_dir_and_writes_json() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("reports").join("nested");

        let path = export(&report(), &dir).unwrap();
        assert!(path.starts_with(&dir));

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["url"], "https://example.com");
        assert_eq!(written["evaluators"]["label"]["status"], "failed");
    }
}
