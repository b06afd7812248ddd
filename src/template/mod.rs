//! Rendering of configured command strings against session data.
//!
//! Templates use tera syntax: `cd {{ path }} && claude {{ prompt | shq }}`.
//! Autoescaping is off since the output is a shell command, not HTML; use the
//! `shq` filter to quote values for `sh`.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tera::{Context, Tera, Value};

use crate::error::{ErrorExt, Result};
use crate::session::Session;

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, data: &TemplateData) -> Result<String>;
}

/// Values exposed to command, window, and recycle templates
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TemplateData {
    pub path: String,
    pub name: String,
    pub prompt: String,
    pub slug: String,
    pub context_dir: String,
    pub owner: String,
    pub repo: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl TemplateData {
    pub fn for_session(session: &Session, prompt: Option<&str>, context_dir: Option<&Path>) -> Self {
        let (owner, repo) = crate::rules::parse_remote(&session.remote)
            .map(|r| (r.owner, r.repo))
            .unwrap_or_default();

        Self {
            path: session.path.display().to_string(),
            name: session.name.clone(),
            prompt: prompt.unwrap_or_default().to_string(),
            slug: session.slug.clone(),
            context_dir: context_dir
                .map(|dir| dir.display().to_string())
                .unwrap_or_default(),
            owner,
            repo,
            extra: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// [`TemplateRenderer`] backed by tera
#[derive(Debug, Default, Clone, Copy)]
pub struct TeraRenderer;

fn shell_quote(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    Ok(Value::String(shell_words::quote(&raw).into_owned()))
}

impl TeraRenderer {
    pub fn new() -> Self {
        Self
    }

    fn engine() -> Tera {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.register_filter("shq", shell_quote);
        tera
    }
}

impl TemplateRenderer for TeraRenderer {
    fn render(&self, template: &str, data: &TemplateData) -> Result<String> {
        // Plain strings are the common case
        if !template.contains("{{") && !template.contains("{%") {
            return Ok(template.to_string());
        }

        let context = Context::from_serialize(data)
            .to_template_error("Failed to build template context")?;
        Self::engine()
            .render_str(template, &context)
            .to_template_error(format!("Failed to render `{template}`"))
    }
}
