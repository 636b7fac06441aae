pub mod project;
pub mod tuning;

use std::path::PathBuf;
use std::time::Duration;

pub use self::project::load_project_config;

/// Configuration for the `blob-publish` binary, read from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Project file with `project_name` and `blobs:`.
    /// Controlled by `PUBLISH_CONFIG` (default: `.blob-publish.yml`).
    pub config_path: PathBuf,
    /// Artifact manifest written by the build pipeline.
    /// Controlled by `PUBLISH_ARTIFACTS` (default: `dist/artifacts.json`).
    pub artifacts_path: PathBuf,
    /// Current git tag. Controlled by `RELEASE_TAG` (required).
    pub release_tag: String,
    /// Controlled by `SKIP_PUBLISH` (default: false).
    pub skip_publish: bool,
    pub limits: PublishLimits,
}

/// Concurrency and time bounds for one publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishLimits {
    /// Targets processed at once. Controlled by `PUBLISH_MAX_CONCURRENT_TARGETS` (default: 4).
    pub max_concurrent_targets: usize,
    /// Uploads in flight per target. Controlled by `PUBLISH_MAX_CONCURRENT_UPLOADS` (default: 4).
    pub max_concurrent_uploads: usize,
    /// After this, no new uploads are started. `None` = no limit.
    /// Controlled by `PUBLISH_TIMEOUT_SECS`.
    pub timeout: Option<Duration>,
}

impl Default for PublishLimits {
    fn default() -> Self {
        Self {
            max_concurrent_targets: 4,
            max_concurrent_uploads: 4,
            timeout: None,
        }
    }
}

impl PublisherConfig {
    /// Read configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let defaults = PublishLimits::default();
        let release_tag = std::env::var("RELEASE_TAG")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| "RELEASE_TAG is required".to_string())?;

        Ok(Self {
            config_path: std::env::var("PUBLISH_CONFIG")
                .unwrap_or_else(|_| ".blob-publish.yml".to_string())
                .into(),
            artifacts_path: std::env::var("PUBLISH_ARTIFACTS")
                .unwrap_or_else(|_| "dist/artifacts.json".to_string())
                .into(),
            release_tag,
            skip_publish: tuning::parse_env_bool("SKIP_PUBLISH", false),
            limits: PublishLimits {
                max_concurrent_targets: tuning::parse_env_nonzero_usize(
                    "PUBLISH_MAX_CONCURRENT_TARGETS",
                    defaults.max_concurrent_targets,
                )?,
                max_concurrent_uploads: tuning::parse_env_nonzero_usize(
                    "PUBLISH_MAX_CONCURRENT_UPLOADS",
                    defaults.max_concurrent_uploads,
                )?,
                timeout: tuning::parse_optional_env_u64("PUBLISH_TIMEOUT_SECS")?
                    .map(Duration::from_secs),
            },
        })
    }
}
