//! Rendering of templated configuration values.
//!
//! The publisher never interprets template syntax itself: it hands a string and a
//! [`TemplateContext`] to a [`TemplateResolver`]. The default resolver is backed by
//! minijinja with strict undefined handling, so a reference to a name that isn't
//! in the context fails instead of rendering as an empty string.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use minijinja::{Environment, UndefinedBehavior, Value};
use serde::Serialize;

/// Values visible to a template.
///
/// Serialized field names are what template authors write: `{{ ProjectName }}`,
/// `{{ Tag }}`, `{{ Version }}`, `{{ Env.AWS_BUCKET }}`. Per-call values (such as
/// `Filename`) go in `extra` and appear at the top level.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateContext {
    #[serde(rename = "ProjectName")]
    pub project_name: String,
    #[serde(rename = "Tag")]
    pub tag: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Env")]
    pub env: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl TemplateContext {
    /// Copy of this context with one additional top-level value.
    #[must_use]
    pub fn with(&self, name: &str, value: impl Into<String>) -> Self {
        let mut ctx = self.clone();
        ctx.extra.insert(name.to_string(), value.into());
        ctx
    }
}

/// A template failed to render. No partial output is ever returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError {
    template: String,
    message: String,
}

impl TemplateError {
    pub fn new(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            message: message.into(),
        }
    }

    /// The source template that failed.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot render '{}': {}", self.template, self.message)
    }
}

impl std::error::Error for TemplateError {}

/// Renders a template string against a context. Must be pure.
pub trait TemplateResolver: Send + Sync + fmt::Debug {
    fn resolve(&self, template: &str, ctx: &TemplateContext) -> Result<String, TemplateError>;
}

/// Default resolver built on minijinja.
pub struct JinjaResolver {
    env: Environment<'static>,
}

impl fmt::Debug for JinjaResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JinjaResolver").finish_non_exhaustive()
    }
}

impl Default for JinjaResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl JinjaResolver {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }
}

impl TemplateResolver for JinjaResolver {
    fn resolve(&self, template: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
        if !template.contains("{{") && !template.contains("{%") {
            return Ok(template.to_string());
        }
        let source = strip_leading_dots(template);
        self.env
            .render_str(&source, Value::from_serialize(ctx))
            .map_err(|e| TemplateError::new(template, format!("{e:#}")))
    }
}

/// Rewrite Go-style field references (`{{ .Env.X }}`, `{{- .Tag }}`) to plain names.
fn strip_leading_dots(template: &str) -> std::borrow::Cow<'_, str> {
    #[allow(clippy::expect_used)]
    static RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"\{\{(-?)\s*\.([A-Za-z_])").expect("leading dot regex")
    });
    RE.replace_all(template, "{{${1} ${2}")
}

/// Interpret a rendered value as a boolean switch (`true`, case-insensitive).
pub fn is_truthy(rendered: &str) -> bool {
    rendered.trim().eq_ignore_ascii_case("true")
}
