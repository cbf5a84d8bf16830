//! # templates: the Markdown template environment
//!
//! Wraps a `minijinja` environment configured for strict undefined handling
//! (an unbound variable is a render error, never a silent blank). The five
//! built-in templates (`base`, `feature`, `service`, `integration`,
//! `generic`) are embedded; a templates directory may replace any of them or
//! add new ones by file name.
//!
//! ## Variants
//! Every render sets exactly one of the `claude` (design) and `wiki` flags,
//! plus `depth` and `root_prefix` for links relative to the design root.
//!
//! ## Link rewriting
//! `to_local_source(url, depth)` maps an external URL that has a fetched copy
//! in the Sources Index to a relative path under the sources tree. Depth is
//! an explicit argument, so a single environment serves renders at any depth.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::contract::{DocCategory, Variant};
use crate::sources::SourcesIndex;

pub const BASE_TEMPLATE: &str = "base.md.jinja";
pub const TEMPLATE_SUFFIX: &str = ".md.jinja";

const BUILTIN_TEMPLATES: [(&str, &str); 5] = [
    (BASE_TEMPLATE, include_str!("../templates/base.md.jinja")),
    ("feature.md.jinja", include_str!("../templates/feature.md.jinja")),
    ("service.md.jinja", include_str!("../templates/service.md.jinja")),
    ("integration.md.jinja", include_str!("../templates/integration.md.jinja")),
    ("generic.md.jinja", include_str!("../templates/generic.md.jinja")),
];

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("template {name} is invalid: {source}")]
    Syntax {
        name: String,
        #[source]
        source: minijinja::Error,
    },
    #[error("failed to render {name}: {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },
    #[error("render context must be a mapping")]
    Context,
}

/// `"../" * depth + prefix + "/" + local` for indexed URLs, the URL otherwise.
pub fn local_source_link(index: &SourcesIndex, prefix: &str, url: &str, depth: usize) -> String {
    match index.local_path_for_url(url) {
        Some(local) => format!(
            "{}{}/{}",
            "../".repeat(depth),
            prefix.trim_end_matches('/'),
            local.trim_start_matches('/')
        ),
        None => url.to_string(),
    }
}

pub struct TemplateEngine {
    env: Environment<'static>,
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.env.templates().map(|(name, _)| name).collect();
        f.debug_struct("TemplateEngine").field("templates", &names).finish()
    }
}

impl TemplateEngine {
    /// Built-in templates, then every `*.md.jinja` in `templates_dir`.
    pub fn new(
        templates_dir: Option<&Path>,
        sources: Arc<SourcesIndex>,
        sources_prefix: &str,
    ) -> Result<TemplateEngine, TemplateError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);

        for (name, source) in BUILTIN_TEMPLATES {
            env.add_template(name, source)
                .map_err(|source| TemplateError::Syntax {
                    name: name.to_string(),
                    source,
                })?;
        }

        if let Some(dir) = templates_dir.filter(|d| d.is_dir()) {
            let entries = std::fs::read_dir(dir).map_err(|source| TemplateError::Read {
                path: dir.to_path_buf(),
                source,
            })?;
            let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
            paths.sort();
            for path in paths {
                let Some(name) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .filter(|n| n.ends_with(TEMPLATE_SUFFIX))
                    .map(str::to_string)
                else {
                    continue;
                };
                let text = std::fs::read_to_string(&path).map_err(|source| TemplateError::Read {
                    path: path.clone(),
                    source,
                })?;
                debug!(template = %name, path = %path.display(), "Template override");
                env.add_template_owned(name.clone(), text)
                    .map_err(|source| TemplateError::Syntax { name, source })?;
            }
        }

        let prefix = sources_prefix.to_string();
        env.add_filter(
            "to_local_source",
            move |url: String, depth: Option<usize>| -> String {
                local_source_link(&sources, &prefix, &url, depth.unwrap_or(0))
            },
        );

        info!(templates = env.templates().count(), "Template environment ready");
        Ok(TemplateEngine { env })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }

    /// Template for a `doc_category` value: the category's own template when
    /// one is registered, otherwise `generic.md.jinja`.
    pub fn template_for(&self, category: &str) -> String {
        let parsed = category.parse::<DocCategory>().ok();
        if let Some(c) = parsed {
            let name = c.template_name();
            if self.has_template(&name) {
                return name;
            }
        }
        let own = format!("{category}{TEMPLATE_SUFFIX}");
        if !category.is_empty() && category != "base" && self.has_template(&own) {
            return own;
        }
        "generic.md.jinja".to_string()
    }

    /// Renders `name` for one variant. `context` must be a JSON object; the
    /// variant flags, `depth` and `root_prefix` are added to a copy of it.
    pub fn render(
        &self,
        name: &str,
        context: &Value,
        variant: Variant,
        depth: usize,
    ) -> Result<String, TemplateError> {
        let mut ctx: Map<String, Value> = context.as_object().cloned().ok_or(TemplateError::Context)?;
        ctx.insert("claude".into(), Value::Bool(variant == Variant::Design));
        ctx.insert("wiki".into(), Value::Bool(variant == Variant::Wiki));
        ctx.insert("depth".into(), Value::from(depth));
        ctx.insert("root_prefix".into(), Value::String("../".repeat(depth)));

        let render_err = |source: minijinja::Error| TemplateError::Render {
            name: name.to_string(),
            source,
        };
        let template = self.env.get_template(name).map_err(render_err)?;
        template.render(Value::Object(ctx)).map_err(render_err)
    }
}
