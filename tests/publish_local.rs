//! End-to-end: project file + artifact manifest → `file` provider bucket on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use blob_publish::artifact::load_manifest;
use blob_publish::backend::ObjectStoreConnector;
use blob_publish::config::load_project_config;
use blob_publish::types::ReleaseContext;
use blob_publish::{PublishSummary, Publisher, TargetState};

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

struct Workspace {
    root: PathBuf,
}

impl Workspace {
    fn new() -> Result<Self> {
        init_tracing();
        let root =
            std::env::temp_dir().join(format!("blob-publish-e2e-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("dist"))?;
        Ok(Self { root })
    }

    fn write(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        let path = self.root.join(rel);
        std::fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    fn bucket(&self, name: &str) -> PathBuf {
        self.root.join("buckets").join(name)
    }

    /// Writes the dist files and a manifest that points at them.
    fn manifest(&self) -> Result<PathBuf> {
        self.write("dist/app_linux_amd64.tar.gz", "fake\ntargz")?;
        self.write("dist/app_amd64.deb", "fake\ndeb")?;
        self.write("dist/checksums.txt", "abc  app_linux_amd64.tar.gz\n")?;
        self.write("notes.md", "release notes")?;
        let dist = self.root.join("dist");
        let manifest = serde_json::json!([
            {
                "name": "app_linux_amd64.tar.gz",
                "path": dist.join("app_linux_amd64.tar.gz"),
                "type": "uploadable_archive",
                "extra": { "ID": "app" }
            },
            {
                "name": "app_amd64.deb",
                "path": dist.join("app_amd64.deb"),
                "type": "linux_package",
                "extra": { "ID": "pkg" }
            },
            {
                "name": "checksums.txt",
                "path": dist.join("checksums.txt"),
                "type": "checksum"
            },
            {
                "name": "app",
                "path": dist.join("app"),
                "type": "binary",
                "extra": { "ID": "app" }
            }
        ]);
        self.write("dist/artifacts.json", &manifest.to_string())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.root).ok();
    }
}

fn files_under(dir: &Path) -> Result<Vec<String>> {
    fn walk(base: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(base, &path, out)?;
            } else {
                out.push(path.strip_prefix(base)?.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    }
    let mut out = Vec::new();
    walk(dir, dir, &mut out)?;
    out.sort();
    Ok(out)
}

#[tokio::test]
async fn publishes_manifest_to_file_buckets() -> Result<()> {
    let ws = Workspace::new()?;
    let manifest = ws.manifest()?;
    let all = ws.bucket("all");
    let pkgs = ws.bucket("pkgs");
    let config = ws.write(
        ".blob-publish.yml",
        &format!(
            r#"project_name: app
blobs:
  - provider: file
    bucket: "{all}"
    extra_files:
      - path: "{notes}"
        name_template: "NOTES-{{{{ .Version }}}}.md"
  - provider: file
    bucket: "{pkgs}"
    folder: "{{{{ .ProjectName }}}}/packages"
    ids: [pkg]
  - provider: file
    bucket: "{off}"
    disable: "{{{{ .Env.SKIP_OFF }}}}"
"#,
            all = all.display(),
            pkgs = pkgs.display(),
            off = ws.bucket("off").display(),
            notes = ws.root.join("notes.md").display(),
        ),
    )?;

    let project = load_project_config(&config)?;
    let mut release = ReleaseContext::new(&project.project_name, "v2.3.0");
    release.env.insert("SKIP_OFF".into(), "true".into());
    release.artifacts = load_manifest(&manifest)?;

    let publisher = Publisher::new(Arc::new(ObjectStoreConnector::new()));
    let PublishSummary::Published(reports) = publisher.publish(&release, &project.blobs).await?
    else {
        anyhow::bail!("expected a published summary");
    };

    let states: Vec<TargetState> = reports.iter().map(|r| r.state).collect();
    assert_eq!(
        states,
        vec![
            TargetState::Succeeded,
            TargetState::Succeeded,
            TargetState::Disabled
        ]
    );

    assert_eq!(
        files_under(&all)?,
        vec![
            "app/v2.3.0/NOTES-2.3.0.md",
            "app/v2.3.0/app_amd64.deb",
            "app/v2.3.0/app_linux_amd64.tar.gz",
            "app/v2.3.0/checksums.txt",
        ]
    );
    assert_eq!(
        files_under(&pkgs)?,
        vec!["app/packages/app_amd64.deb", "app/packages/checksums.txt"]
    );
    assert!(!ws.bucket("off").exists());
    assert_eq!(
        std::fs::read_to_string(all.join("app/v2.3.0/checksums.txt"))?,
        "abc  app_linux_amd64.tar.gz\n"
    );
    Ok(())
}

#[tokio::test]
async fn skip_publish_leaves_buckets_untouched() -> Result<()> {
    let ws = Workspace::new()?;
    let manifest = ws.manifest()?;
    let bucket = ws.bucket("never");
    let config = ws.write(
        ".blob-publish.yml",
        &format!(
            "project_name: app\nblobs:\n  - provider: file\n    bucket: \"{}\"\n",
            bucket.display()
        ),
    )?;

    let project = load_project_config(&config)?;
    let mut release = ReleaseContext::new(&project.project_name, "v1.0.0");
    release.skip_publish = true;
    release.artifacts = load_manifest(&manifest)?;

    let summary = Publisher::new(Arc::new(ObjectStoreConnector::new()))
        .publish(&release, &project.blobs)
        .await?;
    assert_eq!(summary, PublishSummary::Skipped);
    assert!(!bucket.exists());
    Ok(())
}

#[tokio::test]
async fn missing_artifact_file_fails_only_that_upload() -> Result<()> {
    let ws = Workspace::new()?;
    let manifest = ws.manifest()?;
    std::fs::remove_file(ws.root.join("dist/app_amd64.deb"))?;
    let bucket = ws.bucket("partial");
    let config = ws.write(
        ".blob-publish.yml",
        &format!(
            "project_name: app\nblobs:\n  - provider: file\n    bucket: \"{}\"\n",
            bucket.display()
        ),
    )?;

    let project = load_project_config(&config)?;
    let mut release = ReleaseContext::new(&project.project_name, "v1.0.0");
    release.artifacts = load_manifest(&manifest)?;

    let Err(agg) = Publisher::new(Arc::new(ObjectStoreConnector::new()))
        .publish(&release, &project.blobs)
        .await
    else {
        anyhow::bail!("a missing artifact file should fail");
    };
    assert_eq!(agg.len(), 1);
    assert!(agg.to_string().contains("app/v1.0.0/app_amd64.deb"));
    assert_eq!(
        files_under(&bucket)?,
        vec!["app/v1.0.0/app_linux_amd64.tar.gz", "app/v1.0.0/checksums.txt"]
    );
    Ok(())
}
