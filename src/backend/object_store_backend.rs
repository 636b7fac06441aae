use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::buffered::BufWriter;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{BlobBucket, BlobConnector, UploadAttributes};
use crate::key::RemoteKey;
use crate::target::{Provider, ResolvedTarget};

/// Connects targets to `object_store` backends.
///
/// Credentials come from each SDK's usual environment variables:
/// - S3: `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN`, …
/// - GCS: `GOOGLE_SERVICE_ACCOUNT` or application default credentials
/// - Azure: `AZURE_STORAGE_ACCOUNT_NAME`, `AZURE_STORAGE_ACCOUNT_KEY`, …
///
/// `mem` buckets live as long as the connector, so they can be listed after a run.
#[derive(Default)]
pub struct ObjectStoreConnector {
    memory: Mutex<BTreeMap<String, Arc<InMemory>>>,
}

impl std::fmt::Debug for ObjectStoreConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreConnector").finish_non_exhaustive()
    }
}

impl ObjectStoreConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn memory_bucket(&self, name: &str) -> Result<Arc<InMemory>> {
        let mut buckets = self
            .memory
            .lock()
            .map_err(|e| anyhow::anyhow!("memory bucket registry poisoned: {e}"))?;
        Ok(Arc::clone(
            buckets
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(InMemory::new())),
        ))
    }
}

#[async_trait]
impl BlobConnector for ObjectStoreConnector {
    async fn open(&self, target: &ResolvedTarget) -> Result<Box<dyn BlobBucket>> {
        let (store, supports_attributes): (Arc<dyn ObjectStore>, bool) = match target.provider {
            Provider::S3 => (build_s3_store(target)?, true),
            Provider::Gcs => (build_gcs_store(target)?, true),
            Provider::Azure => (build_azure_store(target)?, true),
            // LocalFileSystem rejects object attributes.
            Provider::File => (build_local_store(target).await?, false),
            Provider::Memory => {
                let store: Arc<dyn ObjectStore> = self.memory_bucket(&target.bucket)?;
                (store, true)
            }
        };
        debug!(target_id = %target.id, provider = %target.provider, bucket = %target.bucket, "opened bucket");
        Ok(Box::new(ObjectStoreBucket::new(
            store,
            target.bucket.clone(),
            supports_attributes,
        )))
    }
}

#[cfg(feature = "aws")]
fn build_s3_store(target: &ResolvedTarget) -> Result<Arc<dyn ObjectStore>> {
    let mut builder =
        object_store::aws::AmazonS3Builder::from_env().with_bucket_name(&target.bucket);
    if let Some(region) = &target.region {
        builder = builder.with_region(region);
    }
    if let Some(endpoint) = &target.endpoint {
        builder = builder
            .with_endpoint(endpoint.as_str().trim_end_matches('/'))
            .with_allow_http(target.allow_http);
    }
    builder = apply_addressing(builder, target.addressing);
    let store = builder.build().context("building S3 object store")?;
    Ok(Arc::new(store))
}

/// Path-style is always forced when required. Virtual-hosted is only switched on
/// when the environment has no endpoint or addressing preference of its own: with
/// `AWS_ENDPOINT` set, virtual-hosted mode would treat that endpoint as the bucket URL.
#[cfg(feature = "aws")]
fn apply_addressing(
    builder: object_store::aws::AmazonS3Builder,
    addressing: crate::target::Addressing,
) -> object_store::aws::AmazonS3Builder {
    use crate::target::Addressing;
    use object_store::aws::AmazonS3ConfigKey;

    match addressing {
        Addressing::PathStyle => builder.with_virtual_hosted_style_request(false),
        Addressing::VirtualHosted => {
            let env_decides = builder.get_config_value(&AmazonS3ConfigKey::Endpoint).is_some()
                || std::env::var_os("AWS_VIRTUAL_HOSTED_STYLE_REQUEST").is_some();
            if env_decides {
                builder
            } else {
                builder.with_virtual_hosted_style_request(true)
            }
        }
    }
}

#[cfg(not(feature = "aws"))]
fn build_s3_store(_target: &ResolvedTarget) -> Result<Arc<dyn ObjectStore>> {
    anyhow::bail!("S3 requires the 'aws' feature flag")
}

#[cfg(feature = "gcs")]
fn build_gcs_store(target: &ResolvedTarget) -> Result<Arc<dyn ObjectStore>> {
    let store = object_store::gcp::GoogleCloudStorageBuilder::from_env()
        .with_bucket_name(&target.bucket)
        .build()
        .context("building GCS object store")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "gcs"))]
fn build_gcs_store(_target: &ResolvedTarget) -> Result<Arc<dyn ObjectStore>> {
    anyhow::bail!("GCS requires the 'gcs' feature flag")
}

#[cfg(feature = "azure")]
fn build_azure_store(target: &ResolvedTarget) -> Result<Arc<dyn ObjectStore>> {
    let store = object_store::azure::MicrosoftAzureBuilder::from_env()
        .with_container_name(&target.bucket)
        .build()
        .context("building Azure object store")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "azure"))]
fn build_azure_store(_target: &ResolvedTarget) -> Result<Arc<dyn ObjectStore>> {
    anyhow::bail!("Azure Blob Storage requires the 'azure' feature flag")
}

async fn build_local_store(target: &ResolvedTarget) -> Result<Arc<dyn ObjectStore>> {
    tokio::fs::create_dir_all(&target.bucket)
        .await
        .with_context(|| format!("creating bucket dir {}", target.bucket))?;
    let store = object_store::local::LocalFileSystem::new_with_prefix(&target.bucket)
        .with_context(|| format!("opening bucket dir {}", target.bucket))?;
    Ok(Arc::new(store))
}

/// A bucket handle over any `object_store` backend.
pub struct ObjectStoreBucket {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    supports_attributes: bool,
}

impl std::fmt::Debug for ObjectStoreBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreBucket")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl ObjectStoreBucket {
    /// Wrap an explicit `object_store` instance (for testing).
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String, supports_attributes: bool) -> Self {
        Self {
            store,
            bucket,
            supports_attributes,
        }
    }

    fn attributes(&self, attrs: &UploadAttributes) -> Attributes {
        let mut out = Attributes::new();
        if !self.supports_attributes {
            return out;
        }
        if let Some(disposition) = &attrs.content_disposition {
            out.insert(Attribute::ContentDisposition, disposition.clone().into());
        }
        if let Some(cache_control) = &attrs.cache_control {
            out.insert(Attribute::CacheControl, cache_control.clone().into());
        }
        out
    }
}

#[async_trait]
impl BlobBucket for ObjectStoreBucket {
    async fn put(
        &self,
        key: &RemoteKey,
        local_path: &Path,
        attrs: &UploadAttributes,
    ) -> Result<()> {
        let mut file = tokio::fs::File::open(local_path)
            .await
            .with_context(|| format!("opening {}", local_path.display()))?;

        // Small files go up in one request, large ones as multipart.
        let location = ObjectPath::from(key.as_str());
        let mut writer = BufWriter::new(Arc::clone(&self.store), location)
            .with_attributes(self.attributes(attrs));

        let copied = tokio::io::copy(&mut file, &mut writer).await;
        let result = match copied {
            Ok(_) => writer.shutdown().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            if let Err(abort_err) = writer.abort().await {
                debug!(key = %key, error = %abort_err, "aborting partial upload failed");
            }
            return Err(anyhow::Error::new(e)
                .context(format!("writing {} to {}/{key}", local_path.display(), self.bucket)));
        }
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let prefix = prefix.map(ObjectPath::from);
        let mut keys: Vec<String> = self
            .store
            .list(prefix.as_ref())
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .with_context(|| format!("listing bucket {}", self.bucket))?;
        keys.sort();
        Ok(keys)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        // object_store keeps no session state; dropping the client is enough.
        debug!(bucket = %self.bucket, "closed bucket");
        Ok(())
    }
}
