use std::path::Path;

use anyhow::Context;

use crate::types::ProjectConfig;

/// Load `project_name` and `blobs:` from a YAML project file.
pub fn load_project_config(path: &Path) -> anyhow::Result<ProjectConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    let config: ProjectConfig =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;

    if config.project_name.trim().is_empty() {
        anyhow::bail!("{}: project_name is required", path.display());
    }
    Ok(config)
}
