//! Pipeline configuration: defaults, TOML file, environment, then CLI overrides

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::cltv::{ClvOptions, TimeUnit};
use crate::frame::{AnalysisDate, FrameOptions};
use crate::outliers::OutlierSuppressor;

const ENV_PREFIX: &str = "CLTVFORGE_";
const DEFAULT_CONFIG_FILES: [&str; 2] = ["cltvforge.toml", "config/cltvforge.toml"];

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Everything that controls one batch run
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub outliers: OutlierSuppressor,
    pub frame: FrameOptions,
    pub frequency_penalizer: f64,
    pub monetary_penalizer: f64,
    /// Horizons in months for the expected-sales columns
    pub sales_horizons: [u32; 2],
    pub clv: ClvOptions,
    pub segments: usize,
    pub max_iterations: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Named presets for the frame builder options
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Every customer, analysis date derived from the data
    Exploratory,
    /// Repeat customers with non-zero spend, fixed analysis date
    Generalized,
}

impl Variant {
    pub fn frame_options(self) -> FrameOptions {
        match self {
            Variant::Exploratory => FrameOptions::exploratory(),
            Variant::Generalized => FrameOptions::generalized(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub variant: Option<Variant>,
    pub analysis_date: Option<NaiveDate>,
    pub segments: Option<usize>,
    pub months: Option<u32>,
    pub discount_rate: Option<f64>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            outliers: OutlierSuppressor::default(),
            frame: FrameOptions::generalized(),
            frequency_penalizer: 0.001,
            monetary_penalizer: 0.01,
            sales_horizons: [3, 6],
            clv: ClvOptions::default(),
            segments: 4,
            max_iterations: 20_000,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Compact,
            },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for Variant {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exploratory" => Ok(Self::Exploratory),
            "generalized" => Ok(Self::Generalized),
            other => Err(ConfigError::Validation(format!(
                "unsupported pipeline variant `{other}` (expected exploratory|generalized)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = resolve_config_path(options.config_path.as_deref()) {
            config.apply_patch(read_patch(&path)?);
        } else if options.require_file {
            let expected = options
                .config_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(pipeline) = patch.pipeline {
            let target = &mut self.pipeline;
            if let Some(variant) = pipeline.variant {
                target.frame = variant.frame_options();
            }
            if let Some(analysis_date) = pipeline.analysis_date {
                target.frame.analysis_date = analysis_date;
            }
            if let Some(drop_zero_rows) = pipeline.drop_zero_rows {
                target.frame.drop_zero_rows = drop_zero_rows;
            }
            if let Some(min_frequency) = pipeline.min_frequency {
                target.frame.min_frequency = Some(min_frequency);
            }
            if let Some(segments) = pipeline.segments {
                target.segments = segments;
            }
        }

        if let Some(outliers) = patch.outliers {
            if let Some(lower) = outliers.lower_quantile {
                self.pipeline.outliers.lower_quantile = lower;
            }
            if let Some(upper) = outliers.upper_quantile {
                self.pipeline.outliers.upper_quantile = upper;
            }
        }

        if let Some(model) = patch.model {
            let target = &mut self.pipeline;
            if let Some(penalizer) = model.frequency_penalizer {
                target.frequency_penalizer = penalizer;
            }
            if let Some(penalizer) = model.monetary_penalizer {
                target.monetary_penalizer = penalizer;
            }
            if let Some(max_iterations) = model.max_iterations {
                target.max_iterations = max_iterations;
            }
            if let Some(horizons) = model.sales_horizons {
                target.sales_horizons = horizons;
            }
            if let Some(months) = model.months {
                target.clv.months = months;
            }
            if let Some(discount_rate) = model.discount_rate {
                target.clv.discount_rate = discount_rate;
            }
            if let Some(time_unit) = model.time_unit {
                target.clv.time_unit = time_unit;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("VARIANT") {
            self.pipeline.frame = value.parse::<Variant>()?.frame_options();
        }
        if let Some(value) = read_env("ANALYSIS_DATE") {
            self.pipeline.frame.analysis_date = AnalysisDate::Fixed {
                date: parse_env("ANALYSIS_DATE", &value, |v| {
                    NaiveDate::parse_from_str(v, "%Y-%m-%d").ok()
                })?,
            };
        }
        if let Some(value) = read_env("SEGMENTS") {
            self.pipeline.segments = parse_env("SEGMENTS", &value, |v| v.parse().ok())?;
        }
        if let Some(value) = read_env("MONTHS") {
            self.pipeline.clv.months = parse_env("MONTHS", &value, |v| v.parse().ok())?;
        }
        if let Some(value) = read_env("DISCOUNT_RATE") {
            self.pipeline.clv.discount_rate =
                parse_env("DISCOUNT_RATE", &value, |v| v.parse().ok())?;
        }
        if let Some(value) = read_env("LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(variant) = overrides.variant {
            self.pipeline.frame = variant.frame_options();
        }
        if let Some(date) = overrides.analysis_date {
            self.pipeline.frame.analysis_date = AnalysisDate::Fixed { date };
        }
        if let Some(segments) = overrides.segments {
            self.pipeline.segments = segments;
        }
        if let Some(months) = overrides.months {
            self.pipeline.clv.months = months;
        }
        if let Some(discount_rate) = overrides.discount_rate {
            self.pipeline.clv.discount_rate = discount_rate;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        validate_logging(&self.logging)
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let outliers = &self.outliers;
        let quantiles_ok = (0.0..=1.0).contains(&outliers.lower_quantile)
            && (0.0..=1.0).contains(&outliers.upper_quantile)
            && outliers.lower_quantile < outliers.upper_quantile;
        if !quantiles_ok {
            return Err(ConfigError::Validation(format!(
                "outlier quantiles must satisfy 0 <= lower < upper <= 1 (got {} and {})",
                outliers.lower_quantile, outliers.upper_quantile
            )));
        }
        if self.frequency_penalizer < 0.0 || self.monetary_penalizer < 0.0 {
            return Err(ConfigError::Validation(
                "penalizer coefficients must be non-negative".to_string(),
            ));
        }
        if !(1..=26).contains(&self.segments) {
            return Err(ConfigError::Validation(format!(
                "segments must be between 1 and 26 (got {})",
                self.segments
            )));
        }
        if self.clv.months == 0 || self.sales_horizons.contains(&0) {
            return Err(ConfigError::Validation(
                "forecast horizons must be at least one month".to_string(),
            ));
        }
        if self.clv.discount_rate <= -1.0 {
            return Err(ConfigError::Validation(format!(
                "discount rate must exceed -1 (got {})",
                self.clv.discount_rate
            )));
        }
        if self.clv.time_unit != TimeUnit::Weekly {
            return Err(ConfigError::Validation(
                "recency and tenure are measured in weeks; the CLV time unit must be weekly"
                    .to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Validation(
                "max_iterations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// The level is an `EnvFilter` directive such as `info` or `info,cltvforge=debug`
fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    EnvFilter::try_new(&logging.level).map(|_| ()).map_err(|err| {
        ConfigError::Validation(format!("unsupported log level `{}`: {err}", logging.level))
    })
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<ConfigPatch>(&raw).map_err(|source| ConfigError::ParseFile {
        path: path.to_path_buf(),
        source,
    })
}

fn read_env(key: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{key}"))
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_env<T>(key: &str, value: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T, ConfigError> {
    parse(value.trim()).ok_or_else(|| ConfigError::InvalidEnvOverride {
        key: format!("{ENV_PREFIX}{key}"),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPatch {
    pipeline: Option<PipelinePatch>,
    outliers: Option<OutliersPatch>,
    model: Option<ModelPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PipelinePatch {
    variant: Option<Variant>,
    analysis_date: Option<AnalysisDate>,
    drop_zero_rows: Option<bool>,
    min_frequency: Option<f64>,
    segments: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OutliersPatch {
    lower_quantile: Option<f64>,
    upper_quantile: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelPatch {
    frequency_penalizer: Option<f64>,
    monetary_penalizer: Option<f64>,
    max_iterations: Option<usize>,
    sales_horizons: Option<[u32; 2]>,
    months: Option<u32>,
    discount_rate: Option<f64>,
    time_unit: Option<TimeUnit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
