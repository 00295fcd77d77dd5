//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::{
    application::{
        build::{DEFAULT_BLOCK_RELATION, DEFAULT_DEADLINE_MS, DEFAULT_DOMAIN},
        formula::DEFAULT_MAX_PASSES,
    },
    cache::DEFAULT_REFRESH_LEASE_SECS,
    domain::types::BuildStrategy,
};

pub use cli::{CliArgs, Command, EvalArgs, GlobalOverrides, RenderArgs, RequestArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "tessera";
const ENV_PREFIX: &str = "TESSERA";
const MAX_PASSES_LIMIT: usize = 64;
const DEFAULT_FIXTURE: &str = "demos/content.json";
const DEFAULT_TEMPLATES: &str = "demos/templates";
const DEFAULT_MEDIA_BASE: &str = "/media";

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub build: BuildSettings,
    pub formula: FormulaSettings,
    pub content: ContentSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub refresh_lease: Duration,
}

#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub deadline: Duration,
    pub strategy: BuildStrategy,
    pub block_relation: String,
    /// Host name exposed to templates as `page.domain`.
    pub domain: String,
}

#[derive(Debug, Clone)]
pub struct FormulaSettings {
    pub max_passes: usize,
    pub values: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub fixture: PathBuf,
    pub templates: PathBuf,
    /// Prefix of the image resizing endpoint used by `@resize`.
    pub media_base: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_global_overrides(&cli.overrides);
    if let Command::Render(args) = &cli.command {
        raw.apply_render_overrides(args);
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    build: RawBuildSettings,
    formula: RawFormulaSettings,
    content: RawContentSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    refresh_lease_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBuildSettings {
    deadline_ms: Option<u64>,
    strategy: Option<String>,
    block_relation: Option<String>,
    domain: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFormulaSettings {
    max_passes: Option<usize>,
    values: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawContentSettings {
    fixture: Option<PathBuf>,
    templates: Option<PathBuf>,
    media_base: Option<String>,
}

impl RawSettings {
    fn apply_global_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(fixture) = overrides.fixture.as_ref() {
            self.content.fixture = Some(fixture.clone());
        }
        if let Some(templates) = overrides.templates.as_ref() {
            self.content.templates = Some(templates.clone());
        }
        if overrides.no_cache {
            self.cache.enabled = Some(false);
        }
    }

    fn apply_render_overrides(&mut self, args: &RenderArgs) {
        if args.sequential {
            self.build.strategy = Some(BuildStrategy::Sequential.as_str().to_string());
        }
        if let Some(deadline_ms) = args.deadline_ms {
            self.build.deadline_ms = Some(deadline_ms);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            build,
            formula,
            content,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            build: build_build_settings(build)?,
            formula: build_formula_settings(formula)?,
            content: build_content_settings(content),
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let lease = cache
        .refresh_lease_seconds
        .unwrap_or(DEFAULT_REFRESH_LEASE_SECS);
    if lease == 0 {
        return Err(LoadError::invalid(
            "cache.refresh_lease_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        refresh_lease: Duration::from_secs(lease),
    })
}

fn build_build_settings(build: RawBuildSettings) -> Result<BuildSettings, LoadError> {
    let deadline_ms = build.deadline_ms.unwrap_or(DEFAULT_DEADLINE_MS);
    if deadline_ms == 0 {
        return Err(LoadError::invalid(
            "build.deadline_ms",
            "must be greater than zero",
        ));
    }

    let strategy = match build.strategy {
        Some(raw) => BuildStrategy::from_str(&raw)
            .map_err(|err| LoadError::invalid("build.strategy", err.to_string()))?,
        None => BuildStrategy::default(),
    };

    let block_relation = build
        .block_relation
        .unwrap_or_else(|| DEFAULT_BLOCK_RELATION.to_string());
    if block_relation.trim().is_empty() {
        return Err(LoadError::invalid(
            "build.block_relation",
            "must not be empty",
        ));
    }

    let domain = build
        .domain
        .map(|domain| domain.trim().to_string())
        .filter(|domain| !domain.is_empty())
        .unwrap_or_else(|| DEFAULT_DOMAIN.to_string());

    Ok(BuildSettings {
        deadline: Duration::from_millis(deadline_ms),
        strategy,
        block_relation: block_relation.trim().to_string(),
        domain,
    })
}

fn build_formula_settings(formula: RawFormulaSettings) -> Result<FormulaSettings, LoadError> {
    let max_passes = formula.max_passes.unwrap_or(DEFAULT_MAX_PASSES);
    if max_passes == 0 || max_passes > MAX_PASSES_LIMIT {
        return Err(LoadError::invalid(
            "formula.max_passes",
            format!("must be between 1 and {MAX_PASSES_LIMIT}"),
        ));
    }

    Ok(FormulaSettings {
        max_passes,
        values: formula.values.unwrap_or_default(),
    })
}

fn build_content_settings(content: RawContentSettings) -> ContentSettings {
    ContentSettings {
        fixture: content
            .fixture
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FIXTURE)),
        templates: content
            .templates
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATES)),
        media_base: content
            .media_base
            .unwrap_or_else(|| DEFAULT_MEDIA_BASE.to_string()),
    }
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
