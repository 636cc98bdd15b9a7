//! TOML Configuration File Support
//!
//! Loads strategy tables from a TOML file at
//! `~/.config/switchyard/routes.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables (`SWITCHYARD_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! Strategy lists come from the file only. Environment variables and CLI
//! overrides adjust the logical name and the `[defaults]` section.
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/switchyard/routes.toml` (typically `~/.config/switchyard/routes.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! logical_name = "chat-completion"
//!
//! [defaults]
//! error_cooldown_ms = 5000
//! min_errors_to_disable = 3
//! max_attempts = 2
//!
//! [[strategies]]
//! id = "primary"
//! priority = 300
//! target = "gpt-large"
//! timeout_ms = 30000
//! min_errors_to_disable = 1
//!
//!   [[strategies.retry]]
//!   max_attempts = 3
//!   retryable = ["unavailable", "deadline_exceeded"]
//!   backoff = { initial_ms = 100, max_ms = 2000, multiplier = 2.0, jitter = true }
//!
//! [[strategies]]
//! id = "fallback"
//! priority = 200
//! target = "gpt-small"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::{
    BackendRef, Backoff, ConfigurationError, ErrorKind, RetryPolicy, RetryRule, Strategy,
    StrategyTable,
};

/// Logical name used when neither the file nor the environment sets one
pub const DEFAULT_LOGICAL_NAME: &str = "default";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// The strategies do not form a usable table
    #[error("Invalid strategy table: {0}")]
    Strategy(#[from] ConfigurationError),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Backoff table inside a retry rule
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffToml {
    /// Delay before the first retry in milliseconds
    pub initial_ms: Option<u64>,

    /// Maximum delay in milliseconds
    pub max_ms: Option<u64>,

    /// Growth factor per retry
    pub multiplier: Option<f64>,

    /// Whether to add up to 25% jitter
    pub jitter: Option<bool>,
}

/// One `[[strategies.retry]]` rule
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryRuleToml {
    /// Total attempts allowed, first call included
    pub max_attempts: u32,

    /// Error kinds the rule retries (empty = every transient kind)
    #[serde(default)]
    pub retryable: Vec<ErrorKind>,

    /// Error kinds the rule never retries
    #[serde(default)]
    pub ignored: Vec<ErrorKind>,

    /// Delay between attempts
    #[serde(default)]
    pub backoff: Option<BackoffToml>,
}

/// One `[[strategies]]` entry
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyToml {
    /// Unique strategy id
    pub id: String,

    /// Higher is tried first
    #[serde(default)]
    pub priority: i32,

    /// Backend target (defaults to the id)
    #[serde(default)]
    pub target: Option<String>,

    /// Per-call timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Cooldown after a failure in milliseconds (0 = none)
    #[serde(default)]
    pub error_cooldown_ms: Option<u64>,

    /// Consecutive failures before the strategy is disabled
    #[serde(default)]
    pub min_errors_to_disable: Option<u32>,

    /// In-place retry rules, first match wins
    #[serde(default)]
    pub retry: Vec<RetryRuleToml>,

    /// Backend-specific parameters
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// `[defaults]` section, applied to strategies that leave a field unset
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsToml {
    /// Cooldown after a failure in milliseconds
    pub error_cooldown_ms: Option<u64>,

    /// Consecutive failures before a strategy is disabled
    pub min_errors_to_disable: Option<u32>,

    /// Attempts for strategies with no retry rules
    pub max_attempts: Option<u32>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesToml {
    /// Stable name callers report results under
    pub logical_name: Option<String>,

    /// Defaults section
    pub defaults: DefaultsToml,

    /// Strategy list
    pub strategies: Vec<StrategyToml>,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Defaults applied to every strategy that does not set its own value
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StrategyDefaults {
    /// Cooldown after a failure
    pub error_cooldown: Option<Duration>,
    /// Consecutive failures before disabling
    pub min_errors_to_disable: Option<u32>,
    /// Attempts for strategies with no retry rules
    pub max_attempts: Option<u32>,
}

/// Routing configuration assembled from every source
///
/// Use [`load_config`] to load with proper priority handling, then
/// [`RoutesConfig::strategy_table`] to build the table.
#[derive(Clone, Debug)]
pub struct RoutesConfig {
    /// Stable name callers report results under
    pub logical_name: String,

    /// Per-strategy defaults
    pub defaults: StrategyDefaults,

    /// Strategies as written in the file
    pub strategies: Vec<StrategyToml>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            logical_name: DEFAULT_LOGICAL_NAME.to_string(),
            defaults: StrategyDefaults::default(),
            strategies: Vec::new(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl RoutesConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document (no environment applied)
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or has unknown
    /// fields or error kinds.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let toml_config: RoutesToml = toml::from_str(content)?;
        let mut config = Self::default();
        apply_toml_config(&mut config, toml_config);
        config.source = ConfigSource::File;
        Ok(config)
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Build the validated, priority-sorted strategy table
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Strategy`] for an empty, duplicated or otherwise
    /// unusable table and [`ConfigError::ValidationError`] for a bad backoff.
    pub fn strategy_table(&self) -> Result<StrategyTable, ConfigError> {
        let strategies = self
            .strategies
            .iter()
            .map(|entry| self.build_strategy(entry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StrategyTable::new(self.logical_name.clone(), strategies)?)
    }

    fn build_strategy(&self, entry: &StrategyToml) -> Result<Strategy, ConfigError> {
        let mut backend_ref = BackendRef::new(entry.target.clone().unwrap_or_else(|| entry.id.clone()));
        backend_ref.timeout = entry.timeout_ms.map(Duration::from_millis);
        backend_ref.params = entry.params.clone();

        let rules = if entry.retry.is_empty() {
            self.defaults
                .max_attempts
                .filter(|&n| n > 1)
                .map(RetryRule::new)
                .into_iter()
                .collect()
        } else {
            entry
                .retry
                .iter()
                .map(|rule| build_rule(&entry.id, rule))
                .collect::<Result<Vec<_>, _>>()?
        };

        let cooldown = entry
            .error_cooldown_ms
            .map(Duration::from_millis)
            .or(self.defaults.error_cooldown)
            .filter(|period| !period.is_zero());

        Ok(Strategy {
            id: entry.id.clone(),
            priority: entry.priority,
            backend_ref,
            retry_policy: RetryPolicy::from_rules(rules),
            error_cooldown_period: cooldown,
            min_errors_to_disable: entry
                .min_errors_to_disable
                .or(self.defaults.min_errors_to_disable),
        })
    }
}

fn build_rule(strategy_id: &str, rule: &RetryRuleToml) -> Result<RetryRule, ConfigError> {
    let mut built = RetryRule::new(rule.max_attempts)
        .retrying(rule.retryable.iter().copied())
        .ignoring(rule.ignored.iter().copied());

    if let Some(backoff) = &rule.backoff {
        built = built.with_backoff(build_backoff(strategy_id, backoff)?);
    }
    Ok(built)
}

fn build_backoff(strategy_id: &str, toml: &BackoffToml) -> Result<Backoff, ConfigError> {
    let defaults = Backoff::default();
    let backoff = Backoff {
        initial: toml.initial_ms.map_or(defaults.initial, Duration::from_millis),
        max: toml.max_ms.map_or(defaults.max, Duration::from_millis),
        multiplier: toml.multiplier.unwrap_or(defaults.multiplier),
        jitter: toml.jitter.unwrap_or(defaults.jitter),
    };

    if !backoff.multiplier.is_finite() || backoff.multiplier < 1.0 {
        return Err(ConfigError::ValidationError(format!(
            "strategy {strategy_id}: backoff multiplier must be at least 1.0"
        )));
    }
    if backoff.initial > backoff.max {
        return Err(ConfigError::ValidationError(format!(
            "strategy {strategy_id}: backoff initial_ms exceeds max_ms"
        )));
    }
    Ok(backoff)
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/switchyard/routes.toml` or
/// `~/.config/switchyard/routes.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("switchyard").join("routes.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<RoutesConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<RoutesConfig, ConfigError> {
    let mut config = match path {
        Some(ref config_path) if config_path.exists() => read_config_file(config_path)?,
        Some(ref config_path) => {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
            RoutesConfig::default()
        }
        None => RoutesConfig::default(),
    };

    apply_env_config(&mut config);

    Ok(config)
}

fn read_config_file(config_path: &Path) -> Result<RoutesConfig, ConfigError> {
    let toml_content =
        std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
            path: config_path.to_path_buf(),
            source: e,
        })?;

    let mut config = RoutesConfig::from_toml_str(&toml_content)?;
    config.config_file_path = Some(config_path.to_path_buf());

    tracing::info!(
        path = %config_path.display(),
        strategies = config.strategies.len(),
        "Loaded configuration from file"
    );
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut RoutesConfig, toml: RoutesToml) {
    if let Some(name) = toml.logical_name {
        config.logical_name = name;
    }
    if let Some(ms) = toml.defaults.error_cooldown_ms {
        config.defaults.error_cooldown = Some(Duration::from_millis(ms));
    }
    if let Some(count) = toml.defaults.min_errors_to_disable {
        config.defaults.min_errors_to_disable = Some(count);
    }
    if let Some(attempts) = toml.defaults.max_attempts {
        config.defaults.max_attempts = Some(attempts);
    }
    config.strategies = toml.strategies;
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut RoutesConfig) {
    apply_env_from(config, |key| std::env::var(key).ok());
}

fn apply_env_from(config: &mut RoutesConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(name) = lookup("SWITCHYARD_LOGICAL_NAME") {
        if !name.trim().is_empty() {
            config.logical_name = name;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(ms) = parse_env::<u64>(&lookup, "SWITCHYARD_DEFAULT_COOLDOWN_MS") {
        config.defaults.error_cooldown = Some(Duration::from_millis(ms));
        config.source = ConfigSource::Env;
    }
    if let Some(count) = parse_env::<u32>(&lookup, "SWITCHYARD_DEFAULT_MIN_ERRORS_TO_DISABLE") {
        config.defaults.min_errors_to_disable = Some(count);
        config.source = ConfigSource::Env;
    }
    if let Some(attempts) = parse_env::<u32>(&lookup, "SWITCHYARD_DEFAULT_MAX_ATTEMPTS") {
        config.defaults.max_attempts = Some(attempts);
        config.source = ConfigSource::Env;
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = key, value = %raw, "Ignoring unparseable environment variable");
            None
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Logical name override
    pub logical_name: Option<String>,

    /// Default cooldown override (milliseconds)
    pub default_cooldown_ms: Option<u64>,

    /// Default disable threshold override
    pub default_min_errors_to_disable: Option<u32>,

    /// Default attempts override
    pub default_max_attempts: Option<u32>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set logical name override
    #[must_use]
    pub fn with_logical_name(mut self, name: String) -> Self {
        self.logical_name = Some(name);
        self
    }

    /// Set default cooldown override
    #[must_use]
    pub fn with_default_cooldown_ms(mut self, ms: u64) -> Self {
        self.default_cooldown_ms = Some(ms);
        self
    }

    /// Set default disable threshold override
    #[must_use]
    pub fn with_default_min_errors_to_disable(mut self, count: u32) -> Self {
        self.default_min_errors_to_disable = Some(count);
        self
    }

    /// Set default attempts override
    #[must_use]
    pub fn with_default_max_attempts(mut self, attempts: u32) -> Self {
        self.default_max_attempts = Some(attempts);
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logical_name.is_none()
            && self.default_cooldown_ms.is_none()
            && self.default_min_errors_to_disable.is_none()
            && self.default_max_attempts.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut RoutesConfig) {
        if !self.is_empty() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref name) = self.logical_name {
            config.logical_name.clone_from(name);
        }
        if let Some(ms) = self.default_cooldown_ms {
            config.defaults.error_cooldown = Some(Duration::from_millis(ms));
        }
        if let Some(count) = self.default_min_errors_to_disable {
            config.defaults.min_errors_to_disable = Some(count);
        }
        if let Some(attempts) = self.default_max_attempts {
            config.defaults.max_attempts = Some(attempts);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
logical_name = "chat-completion"

[defaults]
error_cooldown_ms = 5000
min_errors_to_disable = 3
max_attempts = 2

[[strategies]]
id = "fallback"
priority = 200
target = "gpt-small"

[[strategies]]
id = "primary"
priority = 300
target = "gpt-large"
timeout_ms = 30000
min_errors_to_disable = 1
params = { region = "eu" }

  [[strategies.retry]]
  max_attempts = 3
  retryable = ["unavailable", "deadline_exceeded"]
  backoff = { initial_ms = 100, max_ms = 2000, multiplier = 2.0, jitter = false }

[[strategies]]
id = "local"
priority = 100
error_cooldown_ms = 0
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    // =========================================================================
    // Default Configuration Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = RoutesConfig::default();

        assert_eq!(config.logical_name, DEFAULT_LOGICAL_NAME);
        assert_eq!(config.defaults, StrategyDefaults::default());
        assert!(config.strategies.is_empty());
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.to_string_lossy().contains("switchyard"));
            assert!(p.to_string_lossy().ends_with("routes.toml"));
        }
    }

    #[test]
    fn test_empty_config_has_no_table() {
        let err = RoutesConfig::default().strategy_table().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Strategy(ConfigurationError::NoStrategies)
        ));
    }

    // =========================================================================
    // TOML Parsing Tests
    // =========================================================================

    #[test]
    fn test_parse_sample() {
        let config = RoutesConfig::from_toml_str(SAMPLE).unwrap();
        let table = config.strategy_table().unwrap();

        assert_eq!(table.logical_name(), "chat-completion");
        assert_eq!(table.ids(), vec!["primary", "fallback", "local"]);

        let primary = table.find("primary").unwrap();
        assert_eq!(primary.backend_ref.target, "gpt-large");
        assert_eq!(primary.backend_ref.timeout, Some(Duration::from_secs(30)));
        assert_eq!(primary.backend_ref.params.get("region").map(String::as_str), Some("eu"));
        assert_eq!(primary.min_errors_to_disable, Some(1));
        assert_eq!(primary.error_cooldown_period, Some(Duration::from_secs(5)));
        let rule = &primary.retry_policy.rules[0];
        assert_eq!(rule.max_attempts, 3);
        assert_eq!(
            rule.retryable_error_kinds,
            vec![ErrorKind::Unavailable, ErrorKind::DeadlineExceeded]
        );
        assert_eq!(
            rule.backoff.as_ref().map(|b| b.max),
            Some(Duration::from_secs(2))
        );

        let fallback = table.find("fallback").unwrap();
        assert_eq!(fallback.min_errors_to_disable, Some(3));
        assert_eq!(fallback.retry_policy.rules, vec![RetryRule::new(2)]);

        let local = table.find("local").unwrap();
        assert_eq!(local.backend_ref.target, "local");
        assert_eq!(local.error_cooldown_period, None);
    }

    #[test]
    fn test_unknown_error_kind_rejected() {
        let content = r#"
[[strategies]]
id = "a"
  [[strategies.retry]]
  max_attempts = 2
  retryable = ["teapot"]
"#;
        assert!(matches!(
            RoutesConfig::from_toml_str(content),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let content = r#"
[[strategies]]
id = "a"
prioirty = 3
"#;
        assert!(RoutesConfig::from_toml_str(content).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let content = r#"
[[strategies]]
id = "a"
[[strategies]]
id = "a"
"#;
        let err = RoutesConfig::from_toml_str(content)
            .unwrap()
            .strategy_table()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Strategy(ConfigurationError::DuplicateStrategy(ref id)) if id == "a"
        ));
    }

    #[test]
    fn test_bad_backoff_rejected() {
        let content = r#"
[[strategies]]
id = "a"
  [[strategies.retry]]
  max_attempts = 2
  backoff = { initial_ms = 500, max_ms = 100 }
"#;
        let err = RoutesConfig::from_toml_str(content)
            .unwrap()
            .strategy_table()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();

        assert_eq!(config.strategies.len(), 3);
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from_path(Some(dir.path().join("absent.toml"))).unwrap();

        assert!(config.strategies.is_empty());
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"strategies = [[[").unwrap();

        let result = load_config_from_path(Some(file.path().to_path_buf()));
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    // =========================================================================
    // Environment and CLI Override Tests
    // =========================================================================

    #[test]
    fn test_env_overrides_file() {
        let mut config = RoutesConfig::from_toml_str(SAMPLE).unwrap();
        apply_env_from(
            &mut config,
            env(&[
                ("SWITCHYARD_LOGICAL_NAME", "embeddings"),
                ("SWITCHYARD_DEFAULT_COOLDOWN_MS", "750"),
                ("SWITCHYARD_DEFAULT_MAX_ATTEMPTS", "not-a-number"),
            ]),
        );

        assert_eq!(config.logical_name, "embeddings");
        assert_eq!(config.defaults.error_cooldown, Some(Duration::from_millis(750)));
        assert_eq!(config.defaults.max_attempts, Some(2));
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_empty_env_leaves_source() {
        let mut config = RoutesConfig::from_toml_str(SAMPLE).unwrap();
        apply_env_from(&mut config, env(&[]));
        assert_eq!(config.source(), ConfigSource::File);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = RoutesConfig::from_toml_str(SAMPLE).unwrap();
        let overrides = ConfigOverrides::new()
            .with_logical_name("cli-name".to_string())
            .with_default_min_errors_to_disable(5);

        overrides.apply(&mut config);

        assert_eq!(config.logical_name, "cli-name");
        assert_eq!(config.defaults.min_errors_to_disable, Some(5));
        assert_eq!(config.source(), ConfigSource::Cli);

        let table = config.strategy_table().unwrap();
        assert_eq!(table.find("fallback").unwrap().min_errors_to_disable, Some(5));
        assert_eq!(table.find("primary").unwrap().min_errors_to_disable, Some(1));
    }

    #[test]
    fn test_empty_overrides_noop() {
        let mut config = RoutesConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }
}
