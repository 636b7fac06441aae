mod object_store_backend;

pub use object_store_backend::{ObjectStoreBucket, ObjectStoreConnector};

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::key::RemoteKey;
use crate::target::ResolvedTarget;

/// HTTP metadata attached to each uploaded object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadAttributes {
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
}

/// Opens bucket handles. The only place that looks at the provider kind.
#[async_trait]
pub trait BlobConnector: Send + Sync {
    /// Open a handle for a resolved target. Failures skip the whole target.
    async fn open(&self, target: &ResolvedTarget) -> Result<Box<dyn BlobBucket>>;
}

/// An open handle to one bucket. Upload logic only ever talks to this.
#[async_trait]
pub trait BlobBucket: Send + Sync {
    /// Upload the file at `local_path` to `key`, overwriting any existing object.
    async fn put(&self, key: &RemoteKey, local_path: &Path, attrs: &UploadAttributes)
    -> Result<()>;

    /// Keys under `prefix` (or the whole bucket), sorted.
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>>;

    /// Release the handle.
    async fn close(self: Box<Self>) -> Result<()>;
}
