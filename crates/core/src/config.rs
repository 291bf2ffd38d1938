use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// Company configs may override this per rule; this is the fleet default.
    pub default_escalation_hours: i64,
    pub auto_approve_under: Option<Decimal>,
    /// Upper bound on steps pulled per escalation sweep.
    pub sweep_batch_limit: u32,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub default_escalation_hours: Option<i64>,
    pub sweep_batch_limit: Option<u32>,
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
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://spendflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            workflow: WorkflowConfig {
                default_escalation_hours: 48,
                auto_approve_under: None,
                sweep_batch_limit: 500,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
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
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("spendflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(hours) = workflow.default_escalation_hours {
                self.workflow.default_escalation_hours = hours;
            }
            if let Some(raw) = workflow.auto_approve_under {
                self.workflow.auto_approve_under = Some(parse_amount("workflow.auto_approve_under", &raw)?);
            }
            if let Some(limit) = workflow.sweep_batch_limit {
                self.workflow.sweep_batch_limit = limit;
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

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SPENDFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SPENDFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("SPENDFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SPENDFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SPENDFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SPENDFLOW_WORKFLOW_ESCALATION_HOURS") {
            self.workflow.default_escalation_hours =
                parse_i64("SPENDFLOW_WORKFLOW_ESCALATION_HOURS", &value)?;
        }
        if let Some(value) = read_env("SPENDFLOW_WORKFLOW_AUTO_APPROVE_UNDER") {
            self.workflow.auto_approve_under =
                Some(parse_amount("SPENDFLOW_WORKFLOW_AUTO_APPROVE_UNDER", &value)?);
        }
        if let Some(value) = read_env("SPENDFLOW_WORKFLOW_SWEEP_BATCH_LIMIT") {
            self.workflow.sweep_batch_limit =
                parse_u32("SPENDFLOW_WORKFLOW_SWEEP_BATCH_LIMIT", &value)?;
        }

        let log_level =
            read_env("SPENDFLOW_LOGGING_LEVEL").or_else(|| read_env("SPENDFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SPENDFLOW_LOGGING_FORMAT").or_else(|| read_env("SPENDFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(hours) = overrides.default_escalation_hours {
            self.workflow.default_escalation_hours = hours;
        }
        if let Some(limit) = overrides.sweep_batch_limit {
            self.workflow.sweep_batch_limit = limit;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_workflow(&self.workflow)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("spendflow.toml"), PathBuf::from("config/spendflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if !(1..=24 * 365).contains(&workflow.default_escalation_hours) {
        return Err(ConfigError::Validation(
            "workflow.default_escalation_hours must be in range 1..=8760".to_string(),
        ));
    }

    if let Some(amount) = workflow.auto_approve_under {
        if amount <= Decimal::ZERO {
            return Err(ConfigError::Validation(
                "workflow.auto_approve_under must be a positive amount".to_string(),
            ));
        }
    }

    if workflow.sweep_batch_limit == 0 {
        return Err(ConfigError::Validation(
            "workflow.sweep_batch_limit must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
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

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Amounts travel as strings (`"50.00"`) so decimal precision survives the
/// TOML and environment layers.
fn parse_amount(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    default_escalation_hours: Option<i64>,
    auto_approve_under: Option<String>,
    sweep_batch_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_validate_out_of_the_box() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        if config.workflow.default_escalation_hours != 48 {
            return Err("default escalation window should be 48 hours".to_string());
        }
        if config.workflow.auto_approve_under.is_some() {
            return Err("auto-approve should be off by default".to_string());
        }
        Ok(())
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SPENDFLOW_DB", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("spendflow.toml");
            fs::write(
                &path,
                r#"
[database]
url = "${TEST_SPENDFLOW_DB}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            if config.database.url != "sqlite://from-env.db" {
                return Err("database url should be interpolated from environment".to_string());
            }
            Ok(())
        })();

        clear_vars(&["TEST_SPENDFLOW_DB"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SPENDFLOW_DATABASE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("spendflow.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[workflow]
default_escalation_hours = 24
auto_approve_under = "50.00"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            if config.database.url != "sqlite://from-override.db" {
                return Err("override database url should win".to_string());
            }
            if config.logging.level != "debug" {
                return Err("overridden log level should be debug".to_string());
            }
            if config.workflow.default_escalation_hours != 24 {
                return Err("file escalation hours should apply".to_string());
            }
            if config.workflow.auto_approve_under != Some(Decimal::new(5_000, 2)) {
                return Err("auto approve threshold should parse as a decimal".to_string());
            }
            Ok(())
        })();

        clear_vars(&["SPENDFLOW_DATABASE_URL"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SPENDFLOW_LOG_LEVEL", "warn");
        env::set_var("SPENDFLOW_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            if config.logging.level != "warn" {
                return Err("log level alias should be honored".to_string());
            }
            if !matches!(config.logging.format, LogFormat::Pretty) {
                return Err("log format alias should be honored".to_string());
            }
            Ok(())
        })();

        clear_vars(&["SPENDFLOW_LOG_LEVEL", "SPENDFLOW_LOG_FORMAT"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SPENDFLOW_WORKFLOW_ESCALATION_HOURS", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let mentions_field = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("default_escalation_hours")
            );
            if !mentions_field {
                return Err("validation failure should name the offending field".to_string());
            }
            Ok(())
        })();

        clear_vars(&["SPENDFLOW_WORKFLOW_ESCALATION_HOURS"]);
        result
    }

    #[test]
    fn malformed_amount_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SPENDFLOW_WORKFLOW_AUTO_APPROVE_UNDER", "fifty dollars");

        let result = (|| -> Result<(), String> {
            match AppConfig::load(LoadOptions::default()) {
                Ok(_) => Err("expected invalid override error".to_string()),
                Err(ConfigError::InvalidEnvOverride { key, .. })
                    if key == "SPENDFLOW_WORKFLOW_AUTO_APPROVE_UNDER" =>
                {
                    Ok(())
                }
                Err(other) => Err(format!("unexpected error variant: {other}")),
            }
        })();

        clear_vars(&["SPENDFLOW_WORKFLOW_AUTO_APPROVE_UNDER"]);
        result
    }
}
