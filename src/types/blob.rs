use serde::{Deserialize, Serialize};

use crate::key::DEFAULT_FOLDER;

/// Default `Content-Disposition`, rendered per artifact.
pub const DEFAULT_CONTENT_DISPOSITION: &str = "attachment;filename={{ Filename }}";

/// One publish destination, as declared under `blobs:` in the project file.
///
/// `bucket`, `endpoint`, `folder`, `disable` and `content_disposition` are templates
/// and are only rendered when the target is published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobConfig {
    /// `s3`, `gs`, `azblob`, `file` or `mem`.
    pub provider: String,
    pub bucket: String,
    #[serde(default)]
    pub region: String,
    /// Custom endpoint for self-hosted S3-compatible servers (Minio, Ceph, R2…).
    #[serde(default)]
    pub endpoint: String,
    /// Build IDs to upload. Empty = all.
    #[serde(default)]
    pub ids: Vec<String>,
    /// Key prefix inside the bucket (default: `{{ ProjectName }}/{{ Tag }}`).
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Renders to `true` to skip this target.
    #[serde(default)]
    pub disable: String,
    /// `-` disables the header.
    #[serde(default = "default_content_disposition")]
    pub content_disposition: String,
    #[serde(default)]
    pub cache_control: Vec<String>,
    /// Files uploaded in addition to the pipeline's artifacts.
    #[serde(default)]
    pub extra_files: Vec<ExtraFile>,
}

fn default_folder() -> String {
    DEFAULT_FOLDER.to_string()
}

fn default_content_disposition() -> String {
    DEFAULT_CONTENT_DISPOSITION.to_string()
}

impl BlobConfig {
    /// A target with the given provider and bucket and every other field defaulted.
    pub fn new(provider: &str, bucket: &str) -> Self {
        Self {
            provider: provider.to_string(),
            bucket: bucket.to_string(),
            folder: default_folder(),
            content_disposition: default_content_disposition(),
            ..Self::default()
        }
    }
}

/// A local file uploaded alongside the artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraFile {
    pub path: std::path::PathBuf,
    /// Remote file name template. Defaults to the file name of `path`.
    #[serde(default)]
    pub name_template: Option<String>,
}

/// Top-level project file (`.blob-publish.yml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project_name: String,
    #[serde(default)]
    pub blobs: Vec<BlobConfig>,
}
