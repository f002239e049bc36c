//! Model manifest and integrity verification.
//!
//! The engine configuration names one ONNX file per capability. Each entry may
//! carry an expected SHA-256 digest; when present the file is hashed and
//! compared before any model is loaded.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One model file referenced by the engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Capability the model serves (e.g. "face_detector").
    pub name: String,
    /// Absolute, or relative to the configuration directory.
    pub path: PathBuf,
    /// Expected hex SHA-256 digest. `None` skips the checksum.
    pub sha256: Option<String>,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }

    pub fn resolved(&self, base: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            base.join(&self.path)
        }
    }

    /// Check presence and, when a digest is configured, content.
    pub fn verify(&self, base: &Path) -> Result<(), ModelIntegrityError> {
        let path = self.resolved(base);
        if !path.is_file() {
            return Err(ModelIntegrityError::MissingModel {
                name: self.name.clone(),
                path,
            });
        }

        if let Some(expected) = self.sha256.as_deref() {
            let actual = sha256_hex(&path)?;
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err(ModelIntegrityError::ChecksumMismatch {
                    name: self.name.clone(),
                    path,
                    expected: expected.to_string(),
                    actual,
                });
            }
            tracing::debug!(model = %self.name, path = %path.display(), "checksum ok");
        }

        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ModelIntegrityError {
    #[error("{name} model missing at {path}")]
    MissingModel { name: String, path: PathBuf },

    #[error("cannot hash {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{name} model at {path} has sha256 {actual}, expected {expected}")]
    ChecksumMismatch {
        name: String,
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

/// Lowercase hex SHA-256 of a file's contents, streamed.
pub fn sha256_hex(path: &Path) -> Result<String, ModelIntegrityError> {
    let io_err = |source| ModelIntegrityError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = BufReader::new(File::open(path).map_err(io_err)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher).map_err(io_err)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify every entry, stopping at the first failure.
pub fn verify_manifest(base: &Path, models: &[ModelSpec]) -> Result<(), ModelIntegrityError> {
    models.iter().try_for_each(|model| model.verify(base))
}
