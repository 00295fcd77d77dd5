//! Embedded `@name(args)` formula language.
//!
//! Formulas appear inside block configuration and filter strings. Each call
//! is replaced by the text its builtin produces. Configured values that
//! themselves contain calls are expanded up to a configured depth.

mod builtins;
mod evaluator;
pub mod parser;

use thiserror::Error;

use crate::application::{
    context::{DocumentContext, ExtraValues, RequestContext},
    repos::RepoError,
};

pub use builtins::Builtin;
pub use evaluator::{DEFAULT_MAX_PASSES, Evaluator, FormulaConfig, FormulaServices};

/// Failure inside a single builtin; rendered in place of its call.
#[derive(Debug, Clone, Error)]
pub enum FormulaError {
    #[error("@{name} takes {min} to {max} arguments, got {found}")]
    Arity {
        name: &'static str,
        min: usize,
        max: usize,
        found: usize,
    },
    #[error("@{name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
    #[error("index {index} out of range for {len} pieces")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("query failed: {0}")]
    Query(#[from] RepoError),
    #[error("@{name} unavailable: {reason}")]
    Service { name: &'static str, reason: String },
}

impl FormulaError {
    pub fn invalid(builtin: Builtin, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: builtin.name(),
            reason: reason.into(),
        }
    }

    pub fn service(builtin: Builtin, reason: impl Into<String>) -> Self {
        Self::Service {
            name: builtin.name(),
            reason: reason.into(),
        }
    }

    /// Inline text substituted for the failed call.
    pub fn render(&self) -> String {
        format!("[formula error: {self}]")
    }
}

/// Everything a formula may read while being evaluated.
#[derive(Debug, Clone, Copy)]
pub struct FormulaScope<'a> {
    pub request: &'a RequestContext,
    pub document: &'a DocumentContext,
    pub values: &'a ExtraValues,
}

impl<'a> FormulaScope<'a> {
    pub fn new(
        request: &'a RequestContext,
        document: &'a DocumentContext,
        values: &'a ExtraValues,
    ) -> Self {
        Self {
            request,
            document,
            values,
        }
    }
}
