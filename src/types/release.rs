use std::collections::BTreeMap;

use crate::artifact::Artifact;
use crate::template::TemplateContext;

/// Read-only inputs of one publish run, handed over by the release pipeline.
#[derive(Debug, Clone, Default)]
pub struct ReleaseContext {
    pub project_name: String,
    /// Current git tag, e.g. `v1.2.0`.
    pub tag: String,
    /// Set by `--skip-publish`-style switches: the publisher must not touch any backend.
    pub skip_publish: bool,
    /// Environment snapshot exposed to templates as `Env`.
    ///
    /// The publisher never reads the process environment itself; callers decide
    /// what goes in here (usually `std::env::vars()`).
    pub env: BTreeMap<String, String>,
    /// Artifacts in pipeline order.
    pub artifacts: Vec<Artifact>,
}

impl ReleaseContext {
    pub fn new(project_name: &str, tag: &str) -> Self {
        Self {
            project_name: project_name.to_string(),
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    /// The tag without a leading `v`.
    pub fn version(&self) -> &str {
        self.tag.strip_prefix('v').unwrap_or(&self.tag)
    }

    pub fn template_context(&self) -> TemplateContext {
        TemplateContext {
            project_name: self.project_name.clone(),
            tag: self.tag.clone(),
            version: self.version().to_string(),
            env: self.env.clone(),
            extra: BTreeMap::new(),
        }
    }
}
