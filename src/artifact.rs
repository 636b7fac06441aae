use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// What kind of file the build pipeline produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    UploadableArchive,
    UploadableSourceArchive,
    UploadableBinary,
    UploadableFile,
    LinuxPackage,
    Checksum,
    Signature,
    Certificate,
    Sbom,
    /// Raw build output, later packed into an archive.
    Binary,
    /// Pushed to a registry, never to a bucket.
    DockerImage,
    /// Release metadata consumed by later pipeline stages.
    Metadata,
}

impl ArtifactType {
    /// Whether artifacts of this kind belong in a release bucket at all.
    pub const fn is_publishable(self) -> bool {
        matches!(
            self,
            Self::UploadableArchive
                | Self::UploadableSourceArchive
                | Self::UploadableBinary
                | Self::UploadableFile
                | Self::LinuxPackage
                | Self::Checksum
                | Self::Signature
                | Self::Certificate
                | Self::Sbom
        )
    }

    /// Kinds produced per build ID. Only these are subject to a target's `ids` filter.
    pub const fn carries_id(self) -> bool {
        matches!(
            self,
            Self::UploadableArchive
                | Self::UploadableBinary
                | Self::UploadableFile
                | Self::LinuxPackage
        )
    }
}

/// A file produced by the build pipeline. Read-only to the publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: ArtifactType,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, kind: ArtifactType) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
            extra: BTreeMap::new(),
        }
    }

    /// Builder-style helper to set `extra["ID"]`.
    #[must_use]
    pub fn with_id(mut self, id: &str) -> Self {
        self.extra
            .insert("ID".to_string(), serde_json::Value::from(id));
        self
    }

    /// The build ID from `extra["ID"]`, if present and a string.
    pub fn id(&self) -> Option<&str> {
        self.extra.get("ID").and_then(serde_json::Value::as_str)
    }
}

/// Load the `artifacts.json` manifest written by the build pipeline.
pub fn load_manifest(path: &Path) -> Result<Vec<Artifact>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

/// Select the artifacts a target should receive, preserving input order.
///
/// An artifact qualifies when its kind is publishable and either the allow-list is
/// empty, its kind carries no build ID, or its ID is in the allow-list.
pub fn filter<'a>(artifacts: &'a [Artifact], ids: &BTreeSet<String>) -> Vec<&'a Artifact> {
    artifacts
        .iter()
        .filter(|a| a.kind.is_publishable())
        .filter(|a| {
            ids.is_empty() || !a.kind.carries_id() || a.id().is_some_and(|id| ids.contains(id))
        })
        .collect()
}
