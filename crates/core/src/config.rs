use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    pub scheduler: SchedulerConfig,
    pub budget: BudgetConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub products_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Lower bound of the random wait before an automatic suggestion fires.
    pub min_delay_secs: u64,
    /// Upper bound of the random wait.
    pub max_delay_secs: u64,
    /// When false, adding a recipient never arms a timer; manual fetches
    /// still work.
    pub auto_suggest: bool,
}

#[derive(Clone, Debug)]
pub struct BudgetConfig {
    /// Budget the session starts with; mutable at runtime.
    pub initial: f64,
}

#[derive(Clone, Debug)]
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub products_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub min_delay_secs: Option<u64>,
    pub max_delay_secs: Option<u64>,
    pub auto_suggest: Option<bool>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 4000 },
            catalog: CatalogConfig { products_path: PathBuf::from("data/products.json") },
            scheduler: SchedulerConfig {
                min_delay_secs: 30,
                max_delay_secs: 300,
                auto_suggest: true,
            },
            budget: BudgetConfig { initial: 500.0 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("giftly.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(catalog) = patch.catalog {
            if let Some(products_path) = catalog.products_path {
                self.catalog.products_path = products_path;
            }
        }

        if let Some(scheduler) = patch.scheduler {
            if let Some(min_delay_secs) = scheduler.min_delay_secs {
                self.scheduler.min_delay_secs = min_delay_secs;
            }
            if let Some(max_delay_secs) = scheduler.max_delay_secs {
                self.scheduler.max_delay_secs = max_delay_secs;
            }
            if let Some(auto_suggest) = scheduler.auto_suggest {
                self.scheduler.auto_suggest = auto_suggest;
            }
        }

        if let Some(budget) = patch.budget {
            if let Some(initial) = budget.initial {
                self.budget.initial = initial;
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
        if let Some(value) = read_env("GIFTLY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("GIFTLY_SERVER_PORT") {
            self.server.port = parse_u16("GIFTLY_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env("GIFTLY_CATALOG_PRODUCTS_PATH") {
            self.catalog.products_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("GIFTLY_SCHEDULER_MIN_DELAY_SECS") {
            self.scheduler.min_delay_secs = parse_u64("GIFTLY_SCHEDULER_MIN_DELAY_SECS", &value)?;
        }
        if let Some(value) = read_env("GIFTLY_SCHEDULER_MAX_DELAY_SECS") {
            self.scheduler.max_delay_secs = parse_u64("GIFTLY_SCHEDULER_MAX_DELAY_SECS", &value)?;
        }
        if let Some(value) = read_env("GIFTLY_SCHEDULER_AUTO_SUGGEST") {
            self.scheduler.auto_suggest = parse_bool("GIFTLY_SCHEDULER_AUTO_SUGGEST", &value)?;
        }

        if let Some(value) = read_env("GIFTLY_BUDGET_INITIAL") {
            self.budget.initial = parse_f64("GIFTLY_BUDGET_INITIAL", &value)?;
        }

        let log_level = read_env("GIFTLY_LOGGING_LEVEL").or_else(|| read_env("GIFTLY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("GIFTLY_LOGGING_FORMAT").or_else(|| read_env("GIFTLY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(products_path) = overrides.products_path {
            self.catalog.products_path = products_path;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(min_delay_secs) = overrides.min_delay_secs {
            self.scheduler.min_delay_secs = min_delay_secs;
        }
        if let Some(max_delay_secs) = overrides.max_delay_secs {
            self.scheduler.max_delay_secs = max_delay_secs;
        }
        if let Some(auto_suggest) = overrides.auto_suggest {
            self.scheduler.auto_suggest = auto_suggest;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port must be greater than zero".to_string(),
            ));
        }

        if self.scheduler.min_delay_secs == 0 {
            return Err(ConfigError::Validation(
                "scheduler.min_delay_secs must be greater than zero".to_string(),
            ));
        }
        if self.scheduler.max_delay_secs < self.scheduler.min_delay_secs {
            return Err(ConfigError::Validation(
                "scheduler.max_delay_secs must be >= scheduler.min_delay_secs".to_string(),
            ));
        }

        if self.budget.initial < 0.0 {
            return Err(ConfigError::Validation(
                "budget.initial must not be negative".to_string(),
            ));
        }

        let level = self.logging.level.trim().to_ascii_lowercase();
        match level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(ConfigError::Validation(
                "logging.level must be one of trace|debug|info|warn|error".to_string(),
            )),
        }
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("giftly.toml"), PathBuf::from("config/giftly.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str::<ConfigPatch>(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    catalog: Option<CatalogPatch>,
    scheduler: Option<SchedulerPatch>,
    budget: Option<BudgetPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    products_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulerPatch {
    min_delay_secs: Option<u64>,
    max_delay_secs: Option<u64>,
    auto_suggest: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct BudgetPatch {
    initial: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
