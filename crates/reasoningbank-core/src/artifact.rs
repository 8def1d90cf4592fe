//! Run artifacts: a [`RunResult`] persisted as pretty JSON next to a
//! SHA-256 digest sidecar, verified on read.
//!
//! Layout: `<dir>/<run_id>/run.json` and `<dir>/<run_id>/run.digest`.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{BankError, Result};
use crate::runner::RunResult;

const ARTIFACT_FILE: &str = "run.json";
const DIGEST_FILE: &str = "run.digest";

/// Lowercase hex SHA-256 of `data`.
pub fn content_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Write `result` under `dir/<run_id>/`, returning the JSON path.
pub fn write_run_artifact(result: &RunResult, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(&result.run_id);
    std::fs::create_dir_all(&run_dir)?;

    let path = run_dir.join(ARTIFACT_FILE);
    let json = serde_json::to_vec_pretty(result)?;
    std::fs::write(&path, &json)?;
    std::fs::write(run_dir.join(DIGEST_FILE), content_digest(&json).as_bytes())?;
    Ok(path)
}

/// Read and verify the artifact for `run_id`.
pub fn read_run_artifact(run_id: &str, dir: &Path) -> Result<RunResult> {
    let run_dir = dir.join(run_id);
    let json = std::fs::read(run_dir.join(ARTIFACT_FILE))?;
    let expected = std::fs::read_to_string(run_dir.join(DIGEST_FILE))?;
    let actual = content_digest(&json);
    if expected.trim() != actual {
        return Err(BankError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::engine::TrajectoryStep;
    use crate::metrics::LeakageMetrics;

    fn result() -> RunResult {
        RunResult {
            run_id: "run-1".into(),
            task: "What is Activity?".into(),
            answer: "A PROV class".into(),
            query: Some("SELECT ?s WHERE { ?s a prov:Activity }".into()),
            converged: true,
            iteration_count: 1,
            leakage: LeakageMetrics::default(),
            trajectory: vec![TrajectoryStep {
                code: "{}".into(),
                output: "A PROV class".into(),
            }],
            context: "Ontology: PROV-O".into(),
            memory_ids: vec![],
            exhausted: None,
            error: None,
            started_at: Utc::now(),
            duration_ms: 3,
        }
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let original = result();
        let path = write_run_artifact(&original, dir.path()).unwrap();
        assert!(path.ends_with("run-1/run.json"));
        let back = read_run_artifact("run-1", dir.path()).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_tamper_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_run_artifact(&result(), dir.path()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace("A PROV class", "Brick schema")).unwrap();
        let err = read_run_artifact("run-1", dir.path()).unwrap_err();
        assert!(matches!(err, BankError::DigestMismatch { .. }));
    }

    #[test]
    fn test_snapshot_uses_leakage_metrics_key() {
        let json = serde_json::to_value(result()).unwrap();
        assert!(json.get("leakage_metrics").is_some());
        assert_eq!(json["iteration_count"], 1);
    }

    #[test]
    fn test_digest_is_stable_hex() {
        let d = content_digest(b"abc");
        assert_eq!(d.len(), 64);
        assert_eq!(d, content_digest(b"abc"));
    }
}
