//! Audio fingerprinting through the Chromaprint `fpcalc` tool.
//!
//! Whether the tool is usable is decided once at startup by
//! [`Companion::probe`]; a failure is kept as data and only surfaces when
//! the user asks for fingerprinting.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

const FPCALC: &str = if cfg!(windows) { "fpcalc.exe" } else { "fpcalc" };

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("fpcalc not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fpcalc exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("unexpected fpcalc output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Chromaprint fingerprint of one file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Fingerprint {
    /// Track length in seconds as measured by the decoder.
    pub duration: f64,
    pub fingerprint: String,
}

#[async_trait]
pub trait Fingerprinter: Send + Sync + 'static {
    async fn fingerprint(&self, path: &Path) -> Result<Fingerprint, FingerprintError>;
}

// ─── fpcalc ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FpcalcFingerprinter {
    program: PathBuf,
}

impl FpcalcFingerprinter {
    /// Use `explicit` if given, otherwise search `PATH`.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, FingerprintError> {
        if let Some(path) = explicit {
            if path.is_file() {
                return Ok(Self {
                    program: path.to_path_buf(),
                });
            }
            return Err(FingerprintError::NotFound(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let search = std::env::var_os("PATH").unwrap_or_default();
        std::env::split_paths(&search)
            .map(|dir| dir.join(FPCALC))
            .find(|candidate| candidate.is_file())
            .map(|program| Self { program })
            .ok_or_else(|| {
                FingerprintError::NotFound(format!(
                    "{FPCALC} is not on PATH; install Chromaprint or set ENCORE_FPCALC"
                ))
            })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl Fingerprinter for FpcalcFingerprinter {
    async fn fingerprint(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        let output = tokio::process::Command::new(&self.program)
            .arg("-json")
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(FingerprintError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

// ─── Companion ──────────────────────────────────────────────────────────

/// Outcome of probing for the fingerprinting companion at startup.
#[derive(Clone)]
pub enum Companion {
    Loaded(Arc<dyn Fingerprinter>),
    Failed(String),
}

impl std::fmt::Debug for Companion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loaded(_) => f.write_str("Companion::Loaded"),
            Self::Failed(reason) => f.debug_tuple("Companion::Failed").field(reason).finish(),
        }
    }
}

impl Companion {
    pub fn probe(explicit: Option<&Path>) -> Self {
        match FpcalcFingerprinter::locate(explicit) {
            Ok(fpcalc) => {
                tracing::info!(program = %fpcalc.program().display(), "fingerprinting available");
                Self::Loaded(Arc::new(fpcalc))
            }
            Err(e) => {
                tracing::warn!("fingerprinting unavailable: {e}");
                Self::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_explicit_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = FpcalcFingerprinter::locate(Some(&dir.path().join("fpcalc"))).unwrap_err();
        assert!(matches!(err, FingerprintError::NotFound(_)));
    }

    #[test]
    fn test_locate_explicit_present() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("fpcalc");
        std::fs::write(&program, b"").unwrap();
        let fpcalc = FpcalcFingerprinter::locate(Some(&program)).unwrap();
        assert_eq!(fpcalc.program(), program);
    }

    #[test]
    fn test_probe_failure_is_data() {
        let dir = tempfile::tempdir().unwrap();
        match Companion::probe(Some(&dir.path().join("missing"))) {
            Companion::Failed(reason) => assert!(reason.starts_with("fpcalc not found")),
            Companion::Loaded(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn test_parse_fpcalc_json() {
        let fp: Fingerprint =
            serde_json::from_str(r#"{"duration": 243.55, "fingerprint": "AQADtEmUaEkS"}"#).unwrap();
        assert_eq!(fp.fingerprint, "AQADtEmUaEkS");
        assert!((fp.duration - 243.55).abs() < f64::EPSILON);
    }

    // Both scripts are written before either runs, so no spawned child can
    // still hold a write handle on them.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_fpcalc_output_and_failure() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let ok = dir.path().join("fpcalc-ok");
        let failing = dir.path().join("fpcalc-fail");
        std::fs::write(
            &ok,
            "#!/bin/sh\necho '{\"duration\": 12.0, \"fingerprint\": \"AQAA\"}'\n",
        )
        .unwrap();
        std::fs::write(
            &failing,
            "#!/bin/sh\necho 'ERROR: unable to open file' >&2\nexit 2\n",
        )
        .unwrap();
        for program in [&ok, &failing] {
            std::fs::set_permissions(program, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let fpcalc = FpcalcFingerprinter::locate(Some(&ok)).unwrap();
        let fp = fpcalc.fingerprint(Path::new("/music/a.flac")).await.unwrap();
        assert_eq!(fp.fingerprint, "AQAA");

        let fpcalc = FpcalcFingerprinter::locate(Some(&failing)).unwrap();
        match fpcalc.fingerprint(Path::new("/nope.flac")).await.unwrap_err() {
            FingerprintError::Failed { stderr, .. } => {
                assert_eq!(stderr, "ERROR: unable to open file");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
