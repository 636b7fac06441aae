use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use blob_publish::backend::ObjectStoreConnector;
use blob_publish::config::{PublisherConfig, load_project_config};
use blob_publish::types::ReleaseContext;
use blob_publish::{AggregateError, PublishSummary, Publisher, artifact};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // `blob-publish check` resolves every target and exits without uploading.
    let check_only = std::env::args().nth(1).as_deref() == Some("check");

    let config =
        PublisherConfig::from_env().map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
    let project = load_project_config(&config.config_path)?;

    let mut release = ReleaseContext::new(&project.project_name, &config.release_tag);
    release.skip_publish = config.skip_publish;
    release.env = std::env::vars().collect();

    let publisher =
        Publisher::new(Arc::new(ObjectStoreConnector::new())).with_limits(config.limits);

    if check_only {
        return match publisher.check(&release, &project.blobs) {
            Ok(targets) => {
                for target in &targets {
                    info!(
                        target_id = %target.id,
                        provider = %target.provider,
                        bucket = %target.bucket,
                        folder = %target.folder,
                        "target ok"
                    );
                }
                Ok(())
            }
            Err(errors) => Err(report(&errors)),
        };
    }

    // The manifest is only needed when we are actually going to upload.
    if !release.skip_publish {
        release.artifacts = artifact::load_manifest(&config.artifacts_path)?;
    }

    match publisher.publish(&release, &project.blobs).await {
        Ok(PublishSummary::Skipped) => Ok(()),
        Ok(PublishSummary::Published(reports)) => {
            let uploaded: usize = reports.iter().map(|r| r.uploaded.len()).sum();
            info!(targets = reports.len(), uploaded, "all targets published");
            Ok(())
        }
        Err(errors) => Err(report(&errors)),
    }
}

/// Log each failure on its own line and turn the set into the process error.
fn report(errors: &AggregateError) -> anyhow::Error {
    for err in errors.errors() {
        error!(target_id = %err.target(), "{err}");
    }
    anyhow::anyhow!("{} publish error(s)", errors.len())
}
