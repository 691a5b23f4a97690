//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::{ensure, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// When a completed burst is handed to the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvePolicy {
    /// Resolve as soon as the buffer length enters `[min, max]`
    Eager,
    /// Resolve on reaching `max`, otherwise on idle within the window
    Burst,
    /// Always wait for the idle timeout
    Idle,
}

impl ResolvePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvePolicy::Eager => "eager",
            ResolvePolicy::Burst => "burst",
            ResolvePolicy::Idle => "idle",
        }
    }
}

/// What picking a member from a disambiguation list does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Generic search surface: navigate only
    Navigate,
    /// Dedicated check-in surface: record a visit, then navigate
    CheckIn,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Navigate => "navigate",
            SelectionMode::CheckIn => "check_in",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "front-desk".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_resolve_policy")]
    pub resolve_policy: ResolvePolicy,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            max_length: default_max_length(),
            idle_timeout_ms: default_idle_timeout_ms(),
            resolve_policy: default_resolve_policy(),
        }
    }
}

fn default_min_length() -> usize {
    8
}

fn default_max_length() -> usize {
    12
}

fn default_idle_timeout_ms() -> u64 {
    1000
}

fn default_resolve_policy() -> ResolvePolicy {
    ResolvePolicy::Eager
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
    /// Cap on candidates shown in a disambiguation list
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: default_lookup_timeout_ms(),
            max_candidates: default_max_candidates(),
        }
    }
}

fn default_lookup_timeout_ms() -> u64 {
    3000
}

fn default_max_candidates() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_selection_mode")]
    pub selection_mode: SelectionMode,
    #[serde(default = "default_ledger_timeout_ms")]
    pub ledger_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            selection_mode: default_selection_mode(),
            ledger_timeout_ms: default_ledger_timeout_ms(),
        }
    }
}

fn default_selection_mode() -> SelectionMode {
    SelectionMode::CheckIn
}

fn default_ledger_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "default_lease_ttl_ms")]
    pub lease_ttl_ms: u64,
    /// Persist the busy lease here; in-memory when unset
    #[serde(default)]
    pub lease_file: Option<String>,
    /// Drop any lease left behind by a previous process
    #[serde(default = "default_reset_on_start")]
    pub reset_on_start: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            lease_ttl_ms: default_lease_ttl_ms(),
            lease_file: None,
            reset_on_start: default_reset_on_start(),
        }
    }
}

fn default_lease_ttl_ms() -> u64 {
    10_000
}

fn default_reset_on_start() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_members_file")]
    pub members_file: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self { members_file: default_members_file() }
    }
}

fn default_members_file() -> String {
    "members.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// File path for the visit ledger (JSONL format)
    #[serde(default = "default_ledger_file")]
    pub file: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { file: default_ledger_file() }
    }
}

fn default_ledger_file() -> String {
    "visits.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    min_length: usize,
    max_length: usize,
    idle_timeout_ms: u64,
    resolve_policy: ResolvePolicy,
    lookup_timeout_ms: u64,
    max_candidates: usize,
    selection_mode: SelectionMode,
    ledger_timeout_ms: u64,
    lease_ttl_ms: u64,
    lease_file: Option<String>,
    reset_on_start: bool,
    members_file: String,
    ledger_file: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            site_id: toml_config.site.id,
            min_length: toml_config.scanner.min_length,
            max_length: toml_config.scanner.max_length,
            idle_timeout_ms: toml_config.scanner.idle_timeout_ms,
            resolve_policy: toml_config.scanner.resolve_policy,
            lookup_timeout_ms: toml_config.resolver.lookup_timeout_ms,
            max_candidates: toml_config.resolver.max_candidates,
            selection_mode: toml_config.dispatcher.selection_mode,
            ledger_timeout_ms: toml_config.dispatcher.ledger_timeout_ms,
            lease_ttl_ms: toml_config.guard.lease_ttl_ms,
            lease_file: toml_config.guard.lease_file,
            reset_on_start: toml_config.guard.reset_on_start,
            members_file: toml_config.directory.members_file,
            ledger_file: toml_config.ledger.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Determine config file path: command line, then environment, then default
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, path.display().to_string());
        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(cli_path: Option<&str>) -> Self {
        Self::load_from_path(&Self::resolve_config_path(cli_path))
    }

    /// Check the invariants the engine relies on
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.min_length >= 1, "scanner.min_length must be at least 1");
        ensure!(
            self.min_length <= self.max_length,
            "scanner.min_length ({}) must not exceed scanner.max_length ({})",
            self.min_length,
            self.max_length
        );
        ensure!(self.idle_timeout_ms > 0, "scanner.idle_timeout_ms must be positive");
        ensure!(self.lookup_timeout_ms > 0, "resolver.lookup_timeout_ms must be positive");
        ensure!(self.ledger_timeout_ms > 0, "dispatcher.ledger_timeout_ms must be positive");
        ensure!(self.max_candidates >= 2, "resolver.max_candidates must be at least 2");
        ensure!(self.metrics_interval_secs > 0, "metrics.interval_secs must be positive");
        ensure!(
            self.lease_ttl_ms > self.lookup_timeout_ms + self.ledger_timeout_ms,
            "guard.lease_ttl_ms ({}) must exceed lookup_timeout_ms + ledger_timeout_ms ({})",
            self.lease_ttl_ms,
            self.lookup_timeout_ms + self.ledger_timeout_ms
        );
        Ok(())
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn idle_timeout_ms(&self) -> u64 {
        self.idle_timeout_ms
    }

    pub fn resolve_policy(&self) -> ResolvePolicy {
        self.resolve_policy
    }

    pub fn lookup_timeout_ms(&self) -> u64 {
        self.lookup_timeout_ms
    }

    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    pub fn selection_mode(&self) -> SelectionMode {
        self.selection_mode
    }

    pub fn ledger_timeout_ms(&self) -> u64 {
        self.ledger_timeout_ms
    }

    pub fn lease_ttl_ms(&self) -> u64 {
        self.lease_ttl_ms
    }

    pub fn lease_file(&self) -> Option<&str> {
        self.lease_file.as_deref()
    }

    pub fn reset_on_start(&self) -> bool {
        self.reset_on_start
    }

    pub fn members_file(&self) -> &str {
        &self.members_file
    }

    pub fn ledger_file(&self) -> &str {
        &self.ledger_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to set the scan length window
    pub fn with_scan_window(mut self, min_length: usize, max_length: usize) -> Self {
        self.min_length = min_length;
        self.max_length = max_length;
        self
    }

    /// Builder method to set the idle timeout
    pub fn with_idle_timeout_ms(mut self, ms: u64) -> Self {
        self.idle_timeout_ms = ms;
        self
    }

    /// Builder method to set the governor policy
    pub fn with_resolve_policy(mut self, policy: ResolvePolicy) -> Self {
        self.resolve_policy = policy;
        self
    }

    /// Builder method to set the disambiguation selection mode
    pub fn with_selection_mode(mut self, mode: SelectionMode) -> Self {
        self.selection_mode = mode;
        self
    }

    /// Builder method to set the directory lookup timeout
    pub fn with_lookup_timeout_ms(mut self, ms: u64) -> Self {
        self.lookup_timeout_ms = ms;
        self
    }

    /// Builder method to set the visit write timeout
    pub fn with_ledger_timeout_ms(mut self, ms: u64) -> Self {
        self.ledger_timeout_ms = ms;
        self
    }

    /// Builder method to set the guard lease lifetime
    pub fn with_lease_ttl_ms(mut self, ms: u64) -> Self {
        self.lease_ttl_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "front-desk");
        assert_eq!(config.min_length(), 8);
        assert_eq!(config.max_length(), 12);
        assert_eq!(config.idle_timeout_ms(), 1000);
        assert_eq!(config.resolve_policy(), ResolvePolicy::Eager);
        assert_eq!(config.selection_mode(), SelectionMode::CheckIn);
        assert_eq!(config.max_candidates(), 10);
        assert!(config.reset_on_start());
        assert!(config.lease_file().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let config = Config::default().with_scan_window(12, 8);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_length"));
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let err = Config::default().with_lookup_timeout_ms(0).validate().unwrap_err();
        assert!(err.to_string().contains("lookup_timeout_ms"));

        let err = Config::default().with_ledger_timeout_ms(0).validate().unwrap_err();
        assert!(err.to_string().contains("ledger_timeout_ms"));
    }

    #[test]
    fn test_validate_rejects_short_lease() {
        let config = Config::default().with_lease_ttl_ms(4000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[scanner]
min_length = 6
resolve_policy = "burst"

[dispatcher]
selection_mode = "navigate"
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.min_length(), 6);
        assert_eq!(config.max_length(), 12);
        assert_eq!(config.resolve_policy(), ResolvePolicy::Burst);
        assert_eq!(config.selection_mode(), SelectionMode::Navigate);
        assert_eq!(config.ledger_file(), "visits.jsonl");
    }

    #[test]
    fn test_resolve_config_path_prefers_cli() {
        assert_eq!(Config::resolve_config_path(Some("config/front.toml")), "config/front.toml");
    }
}
