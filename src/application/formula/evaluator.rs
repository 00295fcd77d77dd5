use std::{str::FromStr, sync::Arc};

use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    FormulaError, FormulaScope,
    builtins::{self, Builtin, arg, arg_or},
    parser::{self, Arg, Call, Node},
};
use crate::{
    application::repos::{ContentRepository, ImageResizer, Mailer, OutgoingMail},
    cache::Clock,
    domain::types::{AttributeFacet, ObjectField},
};

pub const DEFAULT_MAX_PASSES: usize = 8;
const DEFAULT_SEPARATOR: &str = ",";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FormulaConfig {
    /// Nesting bound for expanding `@config` and `@value` results that
    /// themselves contain calls.
    pub max_passes: usize,
    /// Values exposed through `@config`.
    pub values: Map<String, Value>,
}

impl Default for FormulaConfig {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
            values: Map::new(),
        }
    }
}

impl From<&crate::config::FormulaSettings> for FormulaConfig {
    fn from(settings: &crate::config::FormulaSettings) -> Self {
        Self {
            max_passes: settings.max_passes,
            values: settings.values.clone(),
        }
    }
}

/// External collaborators reachable from builtins.
#[derive(Clone)]
pub struct FormulaServices {
    pub content: Arc<dyn ContentRepository>,
    pub mailer: Arc<dyn Mailer>,
    pub resizer: Arc<dyn ImageResizer>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct Evaluator {
    config: FormulaConfig,
    services: FormulaServices,
}

impl Evaluator {
    pub fn new(config: FormulaConfig, services: FormulaServices) -> Self {
        Self { config, services }
    }

    /// Replace every call in `source` with its result.
    ///
    /// Text that fails to parse comes back unchanged. Builtin failures are
    /// rendered in place of their call.
    pub async fn evaluate(&self, source: &str, scope: &FormulaScope<'_>) -> String {
        if !source.contains('@') {
            return source.to_string();
        }
        match parser::parse(source) {
            Ok(nodes) => self.evaluate_nodes(&nodes, scope, 0).await,
            Err(err) => {
                debug!(error = %err, "formula parse failed; text left unchanged");
                source.to_string()
            }
        }
    }

    fn evaluate_nodes<'a>(
        &'a self,
        nodes: &'a [Node],
        scope: &'a FormulaScope<'a>,
        depth: usize,
    ) -> BoxFuture<'a, String> {
        async move {
            let mut output = String::new();
            for node in nodes {
                match node {
                    Node::Literal(text) => output.push_str(text),
                    Node::Call(call) => {
                        output.push_str(&self.evaluate_call(call, scope, depth).await)
                    }
                }
            }
            output
        }
        .boxed()
    }

    async fn evaluate_call(&self, call: &Call, scope: &FormulaScope<'_>, depth: usize) -> String {
        let Some(builtin) = Builtin::lookup(&call.name) else {
            debug!(function = %call.name, "unknown formula function");
            return String::new();
        };

        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            let value = match arg {
                Arg::Quoted(text) => text.clone(),
                Arg::Bare(nodes) => self.evaluate_nodes(nodes, scope, depth).await,
            };
            args.push(value);
        }

        match self.invoke(builtin, &args, scope).await {
            Ok(value) if builtin.expands_result() => self.expand(value, scope, depth).await,
            Ok(value) => value,
            Err(err) => {
                debug!(function = builtin.name(), error = %err, "formula call failed");
                err.render()
            }
        }
    }

    /// Evaluate calls held in a configured value, at most `max_passes`
    /// levels deep. A value that does not parse is kept as text.
    async fn expand(&self, value: String, scope: &FormulaScope<'_>, depth: usize) -> String {
        let next = depth + 1;
        if next >= self.config.max_passes || !value.contains('@') {
            return value;
        }
        match parser::parse(&value) {
            Ok(nodes) if parser::has_calls(&nodes) => {
                self.evaluate_nodes(&nodes, scope, next).await
            }
            Ok(_) => value,
            Err(err) => {
                debug!(depth = next, error = %err, "configured value kept as text");
                value
            }
        }
    }

    async fn invoke(
        &self,
        builtin: Builtin,
        args: &[String],
        scope: &FormulaScope<'_>,
    ) -> Result<String, FormulaError> {
        builtin.check_arity(args)?;
        let request = scope.request;
        let document = scope.document;

        match builtin {
            Builtin::Rand => Ok(builtins::rand()),
            Builtin::Now => builtins::format_instant(self.services.clock.now(), arg(args, 0)),
            Builtin::DateAdd => builtins::date_add(self.services.clock.now(), args),
            Builtin::SplitIndex => builtins::split_index(
                builtin,
                &args[0],
                arg_or(args, 1, DEFAULT_SEPARATOR),
                &args[2],
                arg(args, 3),
            ),
            Builtin::Replace => builtins::replace(args),
            Builtin::Config => Ok(builtins::lookup_path(&self.config.values, &args[0])
                .map(builtins::value_text)
                .unwrap_or_else(|| default_arg(args, 1))),
            Builtin::Value => Ok(builtins::lookup_path(scope.values, &args[0])
                .map(builtins::value_text)
                .unwrap_or_else(|| default_arg(args, 1))),
            Builtin::User => Ok(or_default(
                request.user.as_ref().and_then(|user| user.field(&args[0])),
                args,
            )),
            Builtin::Profile => Ok(or_default(
                request.profile.get(args[0].trim()).map(String::as_str),
                args,
            )),
            Builtin::Role => Ok(request
                .roles
                .iter()
                .filter_map(|role| role.field(&args[0]))
                .filter(|value| !value.is_empty())
                .collect::<Vec<_>>()
                .join(arg_or(args, 1, DEFAULT_SEPARATOR))),
            Builtin::Cookie => Ok(or_default(
                request.cookies.get(args[0].trim()).map(String::as_str),
                args,
            )),
            Builtin::Form => Ok(or_default(
                request.form.get(args[0].trim()).map(String::as_str),
                args,
            )),
            Builtin::Path => Ok(request.path.clone()),
            Builtin::Domain => Ok(document.page.domain.clone()),
            Builtin::Title => Ok(document.page.title.clone()),
            Builtin::Obj => {
                let field = ObjectField::from_str(&args[0])
                    .map_err(|err| FormulaError::invalid(builtin, err.to_string()))?;
                Ok(document
                    .objects
                    .iter()
                    .map(|object| object.field(field))
                    .collect::<Vec<_>>()
                    .join(arg_or(args, 1, DEFAULT_SEPARATOR)))
            }
            Builtin::Attr => {
                let facet = AttributeFacet::from_str(arg_or(args, 1, "value"))
                    .map_err(|err| FormulaError::invalid(builtin, err.to_string()))?;
                let default = arg(args, 2).unwrap_or_default();
                Ok(document
                    .objects
                    .iter()
                    .map(|object| {
                        object
                            .attribute(args[0].trim())
                            .map(|attribute| attribute.facet(facet))
                            .filter(|value| !value.is_empty())
                            .unwrap_or(default)
                    })
                    .collect::<Vec<_>>()
                    .join(arg_or(args, 3, DEFAULT_SEPARATOR)))
            }
            Builtin::AttrSplit => {
                let value = document
                    .current
                    .as_ref()
                    .and_then(|object| object.value(args[0].trim()))
                    .unwrap_or_default();
                builtins::split_index(
                    builtin,
                    value,
                    arg_or(args, 1, DEFAULT_SEPARATOR),
                    &args[2],
                    arg(args, 3),
                )
            }
            Builtin::Query => self.query(args).await,
            Builtin::SendMail => {
                let mail = OutgoingMail {
                    to: args[0].clone(),
                    subject: args[1].clone(),
                    body: args[2].clone(),
                };
                self.services
                    .mailer
                    .send(mail)
                    .await
                    .map_err(|err| FormulaError::service(builtin, err.to_string()))?;
                Ok(String::new())
            }
            Builtin::Resize => {
                let width = builtins::parse_number(builtin, "width", &args[1])?;
                let height = match arg(args, 2).filter(|raw| !raw.trim().is_empty()) {
                    Some(raw) => Some(builtins::parse_number(builtin, "height", raw)?),
                    None => None,
                };
                self.services
                    .resizer
                    .resize(args[0].trim(), width, height)
                    .await
                    .map_err(|err| FormulaError::service(builtin, err.to_string()))
            }
        }
    }

    /// `name, [mode], [body]` with mode `ids`, `data` or `raw`.
    async fn query(&self, args: &[String]) -> Result<String, FormulaError> {
        let name = args[0].trim();
        let mode = arg_or(args, 1, "ids").trim().to_ascii_lowercase();
        let body = match arg(args, 2).filter(|raw| !raw.trim().is_empty()) {
            Some(raw) => Some(serde_json::from_str::<Value>(raw).map_err(|err| {
                FormulaError::invalid(Builtin::Query, format!("body is not JSON: {err}"))
            })?),
            None => None,
        };
        let method = if body.is_some() { "POST" } else { "GET" };

        let response = self.services.content.run_query(name, method, body).await?;
        let encode = |value: Result<String, serde_json::Error>| {
            value.map_err(|err| FormulaError::invalid(Builtin::Query, err.to_string()))
        };
        match mode.as_str() {
            "ids" => Ok(response.ids().join(DEFAULT_SEPARATOR)),
            "data" => encode(serde_json::to_string(&response.data)),
            "raw" => encode(serde_json::to_string(&response)),
            other => Err(FormulaError::invalid(
                Builtin::Query,
                format!("unknown mode `{other}`"),
            )),
        }
    }
}

fn default_arg(args: &[String], idx: usize) -> String {
    arg(args, idx).unwrap_or_default().to_string()
}

/// Found value when non-empty, else the second argument.
fn or_default(found: Option<&str>, args: &[String]) -> String {
    match found {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => default_arg(args, 1),
    }
}
