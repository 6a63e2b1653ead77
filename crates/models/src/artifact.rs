//! Model artifact I/O.
//!
//! An artifact is a bincode-encoded [`ArtifactHeader`] followed by the
//! bincode-encoded model. The header is decoded first so a file written by
//! another model kind or another layout version is rejected before the
//! payload is touched.

use crate::error::ArtifactError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

pub const MAGIC: [u8; 4] = *b"MREC";

/// Current layout version of every artifact kind
pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    Svd,
    Knn,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Svd => write!(f, "SVD"),
            ArtifactKind::Knn => write!(f, "KNN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub magic: [u8; 4],
    pub kind: ArtifactKind,
    pub version: u32,
}

impl ArtifactHeader {
    pub fn current(kind: ArtifactKind) -> Self {
        Self {
            magic: MAGIC,
            kind,
            version: ARTIFACT_VERSION,
        }
    }
}

/// A model type that can be persisted as an artifact
pub trait Artifact: Serialize + DeserializeOwned {
    const KIND: ArtifactKind;

    /// Cross-field consistency checks run after decoding
    fn validate(&self) -> Result<(), ArtifactError>;
}

/// Write `model` to `path`, creating parent directories
pub fn save<T: Artifact>(model: &T, path: &Path) -> Result<(), ArtifactError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, &ArtifactHeader::current(T::KIND))?;
    bincode::serialize_into(&mut writer, model)?;
    writer.flush()?;

    info!(kind = %T::KIND, path = %path.display(), "Saved model artifact");
    Ok(())
}

/// Read and validate a model from `path`
pub fn load<T: Artifact>(path: &Path) -> Result<T, ArtifactError> {
    if !path.exists() {
        return Err(ArtifactError::NotFound {
            path: path.display().to_string(),
        });
    }

    let mut reader = BufReader::new(File::open(path)?);
    let header: ArtifactHeader = bincode::deserialize_from(&mut reader)?;
    if header.magic != MAGIC {
        return Err(ArtifactError::BadMagic);
    }
    if header.kind != T::KIND {
        return Err(ArtifactError::WrongKind {
            expected: T::KIND.to_string(),
            found: header.kind.to_string(),
        });
    }
    if header.version != ARTIFACT_VERSION {
        return Err(ArtifactError::UnsupportedVersion {
            found: header.version,
            expected: ARTIFACT_VERSION,
        });
    }

    let model: T = bincode::deserialize_from(&mut reader)?;
    model.validate()?;

    info!(kind = %T::KIND, path = %path.display(), "Loaded model artifact");
    Ok(model)
}
