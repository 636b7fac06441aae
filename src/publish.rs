//! The publish run: resolve each target, open its bucket, upload eligible artifacts,
//! and collect every failure without letting one target stop another.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::artifact;
use crate::backend::{BlobBucket, BlobConnector, UploadAttributes};
use crate::config::PublishLimits;
use crate::error::{AggregateError, PublishError};
use crate::key::RemoteKey;
use crate::target::{self, Resolution, ResolvedTarget};
use crate::template::{JinjaResolver, TemplateContext, TemplateResolver};
use crate::types::{BlobConfig, ReleaseContext};

/// Shared stop switch for a publish run.
///
/// Once tripped, no new uploads start. Uploads already in flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.load(Ordering::SeqCst))
    }

    /// A signal that is cancelled when either it or `self` is.
    fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.flag)),
        }
    }
}

/// Lifecycle of one target within a run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TargetState {
    Pending,
    Resolving,
    Connecting,
    Filtering,
    Uploading,
    Closed,
    Succeeded,
    Failed,
    /// `disable` rendered to `true`.
    Disabled,
}

impl TargetState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Disabled)
    }
}

/// What happened to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub id: String,
    pub state: TargetState,
    /// Keys written, in artifact order.
    pub uploaded: Vec<RemoteKey>,
}

/// Successful result of [`Publisher::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishSummary {
    /// `skip_publish` was set; no backend was contacted.
    Skipped,
    /// Every target finished without error. One report per configured target, in order.
    Published(Vec<TargetReport>),
}

/// Mutex-guarded append-only list of failures shared by concurrent uploads.
#[derive(Debug, Default)]
struct ErrorCollector {
    errors: Mutex<Vec<PublishError>>,
}

impl ErrorCollector {
    fn push(&self, err: PublishError) {
        warn!(target_id = %err.target(), error = %err, "publish error");
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(err);
    }

    fn into_aggregate(self) -> AggregateError {
        AggregateError::new(
            self.errors
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

/// One file to send to one target.
#[derive(Debug)]
struct PlannedUpload {
    name: String,
    path: PathBuf,
    key: RemoteKey,
}

/// Per-run state borrowed by every target task.
struct Run<'a> {
    release: &'a ReleaseContext,
    ctx: TemplateContext,
    errors: ErrorCollector,
    cancel: CancelSignal,
}

/// Publishes release artifacts to every configured blob target.
pub struct Publisher {
    connector: Arc<dyn BlobConnector>,
    resolver: Arc<dyn TemplateResolver>,
    limits: PublishLimits,
    cancel: CancelSignal,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("resolver", &self.resolver)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    pub fn new(connector: Arc<dyn BlobConnector>) -> Self {
        Self {
            connector,
            resolver: Arc::new(JinjaResolver::new()),
            limits: PublishLimits::default(),
            cancel: CancelSignal::new(),
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn TemplateResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub const fn with_limits(mut self, limits: PublishLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that stops every future run of this publisher from starting new uploads.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Publish `release` to every target.
    ///
    /// Failures never abort sibling targets or artifacts; they are all returned together.
    pub async fn publish(
        &self,
        release: &ReleaseContext,
        targets: &[BlobConfig],
    ) -> Result<PublishSummary, AggregateError> {
        if release.skip_publish {
            info!(
                targets = targets.len(),
                "skip_publish is set, not publishing to any blob target"
            );
            return Ok(PublishSummary::Skipped);
        }

        info!(
            project = %release.project_name,
            tag = %release.tag,
            targets = targets.len(),
            artifacts = release.artifacts.len(),
            "publishing release artifacts"
        );

        let run = Run {
            release,
            ctx: release.template_context(),
            errors: ErrorCollector::default(),
            cancel: self.cancel.child(),
        };

        let all_targets = futures::stream::iter(targets.iter().enumerate())
            .map(|(index, cfg)| self.publish_target(&run, index, cfg))
            .buffered(self.limits.max_concurrent_targets.max(1))
            .collect::<Vec<_>>();
        let reports = self.with_deadline(&run.cancel, all_targets).await;

        let Run { errors, .. } = run;
        let aggregate = errors.into_aggregate();
        if aggregate.is_empty() {
            info!(targets = reports.len(), "publish complete");
            Ok(PublishSummary::Published(reports))
        } else {
            warn!(errors = aggregate.len(), "publish finished with errors");
            Err(aggregate)
        }
    }

    /// Resolve every target without contacting any backend.
    ///
    /// Returns the enabled targets in configuration order.
    pub fn check(
        &self,
        release: &ReleaseContext,
        targets: &[BlobConfig],
    ) -> Result<Vec<ResolvedTarget>, AggregateError> {
        let ctx = release.template_context();
        let mut resolved = Vec::new();
        let mut errors = Vec::new();
        for (index, cfg) in targets.iter().enumerate() {
            let id = target::target_id(index, cfg);
            match target::resolve(&id, cfg, &ctx, self.resolver.as_ref()) {
                Ok(Resolution::Enabled(target)) => resolved.push(*target),
                Ok(Resolution::Disabled) => debug!(target_id = %id, "target disabled"),
                Err(err) => errors.push(err),
            }
        }
        AggregateError::new(errors).into_result()?;
        Ok(resolved)
    }

    /// Drive `work` to completion, tripping `cancel` if the timeout passes first.
    async fn with_deadline<F: Future>(&self, cancel: &CancelSignal, work: F) -> F::Output {
        let Some(timeout) = self.limits.timeout else {
            return work.await;
        };
        tokio::pin!(work);
        tokio::select! {
            out = &mut work => out,
            () = tokio::time::sleep(timeout) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "publish timeout reached, letting in-flight uploads finish"
                );
                cancel.cancel();
                work.await
            }
        }
    }

    async fn publish_target(&self, run: &Run<'_>, index: usize, cfg: &BlobConfig) -> TargetReport {
        let mut report = TargetReport {
            id: target::target_id(index, cfg),
            state: TargetState::Pending,
            uploaded: Vec::new(),
        };

        advance(&mut report, TargetState::Resolving);
        let target = match target::resolve(&report.id, cfg, &run.ctx, self.resolver.as_ref()) {
            Ok(Resolution::Enabled(target)) => target,
            Ok(Resolution::Disabled) => {
                info!(target_id = %report.id, "target disabled, skipping");
                advance(&mut report, TargetState::Disabled);
                return report;
            }
            Err(err) => {
                run.errors.push(err);
                advance(&mut report, TargetState::Failed);
                return report;
            }
        };

        if run.cancel.is_cancelled() {
            let (uploads, _) = plan_uploads(run, &target);
            for upload in uploads {
                run.errors.push(PublishError::Cancelled {
                    target: report.id.clone(),
                    key: upload.key.to_string(),
                });
            }
            advance(&mut report, TargetState::Failed);
            return report;
        }

        advance(&mut report, TargetState::Connecting);
        let bucket = match self.connector.open(&target).await {
            Ok(bucket) => bucket,
            Err(source) => {
                run.errors.push(PublishError::Connection {
                    target: report.id.clone(),
                    source: source.context(format!("opening {}://{}", target.provider, target.bucket)),
                });
                advance(&mut report, TargetState::Failed);
                return report;
            }
        };

        advance(&mut report, TargetState::Filtering);
        let (uploads, mut failed) = plan_uploads(run, &target);
        if uploads.is_empty() {
            info!(target_id = %report.id, "no eligible artifacts for target");
        }

        advance(&mut report, TargetState::Uploading);
        let results = futures::stream::iter(uploads)
            .map(|upload| self.upload_one(run, &target, bucket.as_ref(), upload))
            .buffered(self.limits.max_concurrent_uploads.max(1))
            .collect::<Vec<_>>()
            .await;
        for result in results {
            match result {
                Some(key) => report.uploaded.push(key),
                None => failed = true,
            }
        }

        if let Err(source) = bucket.close().await {
            run.errors.push(PublishError::Connection {
                target: report.id.clone(),
                source: source.context("closing bucket"),
            });
            failed = true;
        }
        advance(&mut report, TargetState::Closed);

        if failed {
            advance(&mut report, TargetState::Failed);
        } else {
            info!(
                target_id = %report.id,
                bucket = %target.bucket,
                uploaded = report.uploaded.len(),
                "target published"
            );
            advance(&mut report, TargetState::Succeeded);
        }
        report
    }

    /// Upload one file. Returns the key on success; failures go to the collector.
    async fn upload_one(
        &self,
        run: &Run<'_>,
        target: &ResolvedTarget,
        bucket: &dyn BlobBucket,
        upload: PlannedUpload,
    ) -> Option<RemoteKey> {
        if run.cancel.is_cancelled() {
            run.errors.push(PublishError::Cancelled {
                target: target.id.clone(),
                key: upload.key.to_string(),
            });
            return None;
        }

        let attrs = match self.upload_attributes(run, target, &upload.name) {
            Ok(attrs) => attrs,
            Err(err) => {
                run.errors.push(err);
                return None;
            }
        };

        debug!(target_id = %target.id, key = %upload.key, path = %upload.path.display(), "uploading");
        match bucket.put(&upload.key, &upload.path, &attrs).await {
            Ok(()) => {
                info!(target_id = %target.id, key = %upload.key, "uploaded");
                Some(upload.key)
            }
            Err(source) => {
                run.errors.push(PublishError::Upload {
                    target: target.id.clone(),
                    key: upload.key.to_string(),
                    source,
                });
                None
            }
        }
    }

    fn upload_attributes(
        &self,
        run: &Run<'_>,
        target: &ResolvedTarget,
        file_name: &str,
    ) -> Result<UploadAttributes, PublishError> {
        let content_disposition = target
            .content_disposition
            .as_deref()
            .map(|template| {
                self.resolver
                    .resolve(template, &run.ctx.with("Filename", file_name))
            })
            .transpose()
            .map_err(|source| PublishError::Template {
                target: target.id.clone(),
                field: "content_disposition",
                source,
            })?;
        Ok(UploadAttributes {
            content_disposition,
            cache_control: target.cache_control.clone(),
        })
    }
}

/// Move a report to its next state.
fn advance(report: &mut TargetReport, next: TargetState) {
    debug_assert!(
        next > report.state && !report.state.is_terminal(),
        "illegal target transition {:?} -> {next:?}",
        report.state
    );
    debug!(target_id = %report.id, from = ?report.state, to = ?next, "target state");
    report.state = next;
}

/// Eligible artifacts plus extra files, with their keys.
///
/// Two files mapping to the same key would silently overwrite each other, so the
/// second one is dropped and reported. Returns whether any such collision occurred.
fn plan_uploads(run: &Run<'_>, target: &ResolvedTarget) -> (Vec<PlannedUpload>, bool) {
    let candidates = artifact::filter(&run.release.artifacts, &target.ids)
        .into_iter()
        .map(|a| (a.name.clone(), a.path.clone()))
        .chain(
            target
                .extra_files
                .iter()
                .map(|f| (f.name.clone(), f.path.clone())),
        );

    let mut seen: BTreeMap<RemoteKey, PathBuf> = BTreeMap::new();
    let mut uploads = Vec::new();
    let mut collided = false;
    for (name, path) in candidates {
        let key = RemoteKey::new(&target.folder, &name);
        if let Some(first) = seen.get(&key) {
            run.errors.push(PublishError::Configuration {
                target: target.id.clone(),
                message: format!(
                    "{} and {} both map to key {key}",
                    first.display(),
                    path.display()
                ),
            });
            collided = true;
            continue;
        }
        seen.insert(key.clone(), path.clone());
        uploads.push(PlannedUpload { name, path, key });
    }
    (uploads, collided)
}
