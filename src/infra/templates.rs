//! `minijinja`-backed template engine.

use std::{path::Path, sync::RwLock};

use async_trait::async_trait;
use minijinja::{AutoEscape, Environment, ErrorKind};
use serde_json::Value;

use crate::{
    application::render::{TemplateEngine, TemplateError},
    cache::lock::{rw_read, rw_write},
    domain::entities::TemplateRef,
};

use super::error::InfraError;

const SOURCE: &str = "infra::templates";

/// Named templates come from a directory loader or explicit registration;
/// inline sources are compiled per render.
#[derive(Debug)]
pub struct MiniJinjaEngine {
    env: RwLock<Environment<'static>>,
}

impl Default for MiniJinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MiniJinjaEngine {
    pub fn new() -> Self {
        Self {
            env: RwLock::new(environment()),
        }
    }

    pub fn with_directory(dir: &Path) -> Result<Self, InfraError> {
        if !dir.is_dir() {
            return Err(InfraError::template(format!(
                "template directory `{}` does not exist",
                dir.display()
            )));
        }
        let mut env = environment();
        env.set_loader(minijinja::path_loader(dir));
        Ok(Self {
            env: RwLock::new(env),
        })
    }

    pub fn add_template(
        &self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), InfraError> {
        let name = name.into();
        rw_write(&self.env, SOURCE, "add_template")
            .add_template_owned(name.clone(), source.into())
            .map_err(|err| InfraError::template(format!("template `{name}`: {err}")))
    }
}

#[async_trait]
impl TemplateEngine for MiniJinjaEngine {
    async fn render(
        &self,
        template: &TemplateRef,
        context: &Value,
    ) -> Result<String, TemplateError> {
        let env = rw_read(&self.env, SOURCE, "render");
        let rendered = match template {
            TemplateRef::Named(name) => env
                .get_template(name)
                .and_then(|compiled| compiled.render(context)),
            TemplateRef::Inline(source) => env.render_str(source, context),
        };
        rendered.map_err(|err| map_error(template, err))
    }
}

/// Block output is already markup, so nothing is escaped unless a template
/// asks for it.
fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env
}

fn map_error(template: &TemplateRef, err: minijinja::Error) -> TemplateError {
    match err.kind() {
        ErrorKind::TemplateNotFound => TemplateError::NotFound {
            name: match template {
                TemplateRef::Named(name) => name.clone(),
                TemplateRef::Inline(_) => "<inline>".to_string(),
            },
        },
        ErrorKind::SyntaxError => TemplateError::Syntax {
            message: err.to_string(),
        },
        _ => TemplateError::render(err.to_string()),
    }
}
