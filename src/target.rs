//! Turning a declared [`BlobConfig`] into a concrete [`ResolvedTarget`].

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use url::Url;

use crate::error::PublishError;
use crate::template::{TemplateContext, TemplateResolver, is_truthy};
use crate::types::BlobConfig;

/// Storage provider a target talks to. Chosen once, at resolution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Amazon S3 and S3-compatible servers.
    S3,
    /// Google Cloud Storage.
    Gcs,
    /// Azure Blob Storage.
    Azure,
    /// A directory on the local filesystem; the bucket is the directory path.
    File,
    /// In-process store, mainly for dry runs and tests.
    Memory,
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "gs" | "gcs" => Ok(Self::Gcs),
            "azblob" | "azure" => Ok(Self::Azure),
            "file" => Ok(Self::File),
            "mem" | "memory" => Ok(Self::Memory),
            "" => Err("provider is required".to_string()),
            other => Err(format!(
                "unknown provider '{other}' (expected s3, gs, azblob, file or mem)"
            )),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::S3 => "s3",
            Self::Gcs => "gs",
            Self::Azure => "azblob",
            Self::File => "file",
            Self::Memory => "mem",
        })
    }
}

/// How bucket names map onto request URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// `https://bucket.host/key`, the provider default.
    VirtualHosted,
    /// `https://host/bucket/key`, used by most self-hosted servers.
    PathStyle,
}

impl Addressing {
    /// Virtual-hosted only works when the bucket is a single DNS label: a dotted name
    /// becomes several host labels and no longer matches the provider's wildcard
    /// certificate.
    pub fn for_bucket(bucket: &str) -> Self {
        let label_ok = (3..=63).contains(&bucket.len())
            && bucket
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
            && !bucket.starts_with('-')
            && !bucket.ends_with('-');
        if label_ok {
            Self::VirtualHosted
        } else {
            Self::PathStyle
        }
    }
}

/// An extra file with its remote name already rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedExtraFile {
    pub path: PathBuf,
    pub name: String,
}

/// A target with every template rendered and every field validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Stable identity used in logs and errors, e.g. `blobs[0](s3://releases)`.
    pub id: String,
    pub provider: Provider,
    pub bucket: String,
    /// `None` lets the SDK pick its default region.
    pub region: Option<String>,
    /// `None` means the provider's public endpoint.
    pub endpoint: Option<Url>,
    pub addressing: Addressing,
    pub allow_http: bool,
    /// Key prefix, rendered.
    pub folder: String,
    pub ids: BTreeSet<String>,
    /// Still a template: it is rendered per artifact with `Filename` set.
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    pub extra_files: Vec<ResolvedExtraFile>,
}

/// Result of resolving one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Enabled(Box<ResolvedTarget>),
    /// `disable` rendered to `true`; the target is skipped without error.
    Disabled,
}

/// Identity string for the `index`-th configured target.
pub fn target_id(index: usize, cfg: &BlobConfig) -> String {
    format!("blobs[{index}]({}://{})", cfg.provider, cfg.bucket)
}

/// Render and validate one target.
///
/// Errors are fatal for this target only; the orchestrator records them and moves on.
pub fn resolve(
    id: &str,
    cfg: &BlobConfig,
    ctx: &TemplateContext,
    resolver: &dyn TemplateResolver,
) -> Result<Resolution, PublishError> {
    let render = |field: &'static str, template: &str| {
        resolver
            .resolve(template, ctx)
            .map_err(|source| PublishError::Template {
                target: id.to_string(),
                field,
                source,
            })
    };
    let config_err = |message: String| PublishError::Configuration {
        target: id.to_string(),
        message,
    };

    if is_truthy(&render("disable", &cfg.disable)?) {
        return Ok(Resolution::Disabled);
    }

    let provider: Provider = cfg.provider.parse().map_err(config_err)?;

    let bucket = render("bucket", &cfg.bucket)?.trim().to_string();
    if bucket.is_empty() {
        return Err(config_err("bucket resolved to an empty string".to_string()));
    }

    let endpoint = render("endpoint", &cfg.endpoint)?;
    let endpoint = endpoint.trim();
    let (endpoint, addressing, allow_http) = if endpoint.is_empty() {
        (None, Addressing::for_bucket(&bucket), false)
    } else {
        if provider != Provider::S3 {
            return Err(config_err(format!(
                "custom endpoint is only supported for s3, not {provider}"
            )));
        }
        let url = Url::parse(endpoint)
            .map_err(|e| config_err(format!("invalid endpoint '{endpoint}': {e}")))?;
        let allow_http = url.scheme() == "http";
        (Some(url), Addressing::PathStyle, allow_http)
    };

    let region = Some(cfg.region.trim())
        .filter(|r| !r.is_empty())
        .map(ToString::to_string);

    let folder = render("folder", &cfg.folder)?;

    let content_disposition = match cfg.content_disposition.trim() {
        "" | "-" => None,
        template => {
            // Catch undefined references now rather than once per artifact.
            resolver
                .resolve(template, &ctx.with("Filename", "artifact"))
                .map_err(|source| PublishError::Template {
                    target: id.to_string(),
                    field: "content_disposition",
                    source,
                })?;
            Some(template.to_string())
        }
    };

    let cache_control = Some(cfg.cache_control.join(", ")).filter(|c| !c.is_empty());

    let mut extra_files = Vec::with_capacity(cfg.extra_files.len());
    for extra in &cfg.extra_files {
        let name = match &extra.name_template {
            Some(template) => render("extra_files.name_template", template)?,
            None => extra
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    config_err(format!("extra file {} has no file name", extra.path.display()))
                })?,
        };
        extra_files.push(ResolvedExtraFile {
            path: extra.path.clone(),
            name,
        });
    }

    Ok(Resolution::Enabled(Box::new(ResolvedTarget {
        id: id.to_string(),
        provider,
        bucket,
        region,
        endpoint,
        addressing,
        allow_http,
        folder,
        ids: cfg.ids.iter().cloned().collect(),
        content_disposition,
        cache_control,
        extra_files,
    })))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::template::JinjaResolver;
    use crate::types::ExtraFile;

    fn ctx() -> TemplateContext {
        TemplateContext {
            project_name: "testupload".into(),
            tag: "v1.0.0".into(),
            version: "1.0.0".into(),
            env: BTreeMap::from([("BUCKET_ID".to_string(), "test".to_string())]),
            extra: BTreeMap::new(),
        }
    }

    fn resolve_enabled(cfg: &BlobConfig) -> anyhow::Result<ResolvedTarget> {
        match resolve("t", cfg, &ctx(), &JinjaResolver::new())? {
            Resolution::Enabled(target) => Ok(*target),
            Resolution::Disabled => anyhow::bail!("target unexpectedly disabled"),
        }
    }

    #[test]
    fn provider_parsing() {
        assert_eq!("s3".parse::<Provider>(), Ok(Provider::S3));
        assert_eq!("GCS".parse::<Provider>(), Ok(Provider::Gcs));
        assert_eq!("azblob".parse::<Provider>(), Ok(Provider::Azure));
        assert_eq!("mem".parse::<Provider>(), Ok(Provider::Memory));
        assert!("ftp".parse::<Provider>().is_err());
        assert!("".parse::<Provider>().is_err());
    }

    #[test]
    fn defaults_resolve_to_release_folder() -> anyhow::Result<()> {
        let target = resolve_enabled(&BlobConfig::new("s3", "releases"))?;
        assert_eq!(target.provider, Provider::S3);
        assert_eq!(target.bucket, "releases");
        assert_eq!(target.folder, "testupload/v1.0.0");
        assert_eq!(target.region, None);
        assert_eq!(target.endpoint, None);
        assert_eq!(target.addressing, Addressing::VirtualHosted);
        assert!(target.content_disposition.is_some());
        assert!(target.cache_control.is_none());
        Ok(())
    }

    #[test]
    fn endpoint_forces_path_style() -> anyhow::Result<()> {
        let mut cfg = BlobConfig::new("s3", "{{.Env.BUCKET_ID}}");
        cfg.endpoint = "http://127.0.0.1:9000".into();
        cfg.region = "us-east".into();
        let target = resolve_enabled(&cfg)?;
        assert_eq!(target.bucket, "test");
        assert_eq!(target.addressing, Addressing::PathStyle);
        assert!(target.allow_http);
        assert_eq!(target.region.as_deref(), Some("us-east"));
        Ok(())
    }

    #[test]
    fn dotted_bucket_uses_path_style() -> anyhow::Result<()> {
        let target = resolve_enabled(&BlobConfig::new("s3", "releases.example.com"))?;
        assert!(target.endpoint.is_none());
        assert_eq!(target.addressing, Addressing::PathStyle);
        Ok(())
    }

    #[test]
    fn bucket_addressing_rules() {
        assert_eq!(Addressing::for_bucket("releases"), Addressing::VirtualHosted);
        assert_eq!(Addressing::for_bucket("my-releases-2"), Addressing::VirtualHosted);
        assert_eq!(Addressing::for_bucket("releases.example.com"), Addressing::PathStyle);
        assert_eq!(Addressing::for_bucket("Releases"), Addressing::PathStyle);
        assert_eq!(Addressing::for_bucket("my_releases"), Addressing::PathStyle);
        assert_eq!(Addressing::for_bucket("-releases"), Addressing::PathStyle);
        assert_eq!(Addressing::for_bucket("ab"), Addressing::PathStyle);
    }

    #[test]
    fn https_endpoint_disallows_http() -> anyhow::Result<()> {
        let mut cfg = BlobConfig::new("s3", "b");
        cfg.endpoint = "https://minio.internal".into();
        assert!(!resolve_enabled(&cfg)?.allow_http);
        Ok(())
    }

    #[test]
    fn bad_bucket_template_is_template_error() {
        let cfg = BlobConfig::new("s3", "{{.Bad}}");
        let err = resolve("t", &cfg, &ctx(), &JinjaResolver::new());
        assert!(matches!(
            err,
            Err(PublishError::Template { field: "bucket", .. })
        ));
    }

    #[test]
    fn unknown_provider_is_config_error() {
        let cfg = BlobConfig::new("ftp", "b");
        let err = resolve("t", &cfg, &ctx(), &JinjaResolver::new());
        assert!(matches!(err, Err(PublishError::Configuration { .. })));
    }

    #[test]
    fn empty_bucket_is_config_error() {
        let cfg = BlobConfig::new("s3", "  ");
        let err = resolve("t", &cfg, &ctx(), &JinjaResolver::new());
        assert!(matches!(err, Err(PublishError::Configuration { .. })));
    }

    #[test]
    fn endpoint_rejected_for_non_s3() {
        let mut cfg = BlobConfig::new("gs", "b");
        cfg.endpoint = "http://localhost:4443".into();
        let err = resolve("t", &cfg, &ctx(), &JinjaResolver::new());
        assert!(matches!(err, Err(PublishError::Configuration { .. })));
    }

    #[test]
    fn malformed_endpoint_is_config_error() {
        let mut cfg = BlobConfig::new("s3", "b");
        cfg.endpoint = "not a url".into();
        let err = resolve("t", &cfg, &ctx(), &JinjaResolver::new());
        assert!(matches!(err, Err(PublishError::Configuration { .. })));
    }

    #[test]
    fn disabled_target_skips_bucket_rendering() -> anyhow::Result<()> {
        let mut cfg = BlobConfig::new("s3", "{{.Bad}}");
        cfg.disable = "{{ Tag == 'v1.0.0' }}".into();
        let res = resolve("t", &cfg, &ctx(), &JinjaResolver::new())?;
        assert_eq!(res, Resolution::Disabled);
        Ok(())
    }

    #[test]
    fn dash_disables_content_disposition() -> anyhow::Result<()> {
        let mut cfg = BlobConfig::new("s3", "b");
        cfg.content_disposition = "-".into();
        cfg.cache_control = vec!["max-age=60".into(), "public".into()];
        let target = resolve_enabled(&cfg)?;
        assert!(target.content_disposition.is_none());
        assert_eq!(target.cache_control.as_deref(), Some("max-age=60, public"));
        Ok(())
    }

    #[test]
    fn bad_content_disposition_fails_at_resolution() {
        let mut cfg = BlobConfig::new("s3", "b");
        cfg.content_disposition = "inline;filename={{ Nope }}".into();
        let err = resolve("t", &cfg, &ctx(), &JinjaResolver::new());
        assert!(matches!(
            err,
            Err(PublishError::Template {
                field: "content_disposition",
                ..
            })
        ));
    }

    #[test]
    fn extra_file_names() -> anyhow::Result<()> {
        let mut cfg = BlobConfig::new("s3", "b");
        cfg.extra_files = vec![
            ExtraFile {
                path: PathBuf::from("docs/install.sh"),
                name_template: None,
            },
            ExtraFile {
                path: PathBuf::from("docs/notes.md"),
                name_template: Some("notes-{{ Version }}.md".into()),
            },
        ];
        let target = resolve_enabled(&cfg)?;
        let names: Vec<&str> = target.extra_files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["install.sh", "notes-1.0.0.md"]);
        Ok(())
    }

    #[test]
    fn target_id_names_index_and_bucket() {
        let cfg = BlobConfig::new("s3", "{{.Bad}}");
        assert_eq!(target_id(1, &cfg), "blobs[1](s3://{{.Bad}})");
    }
}
