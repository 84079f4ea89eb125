//! Runtime configuration.
//!
//! # Responsibility
//! - Load `SyncConfig` from TOML and apply `GISTNOTE_*` environment overrides.
//! - Validate credentials, endpoints and capture geometry before any I/O.
//! - Hand each adapter its own options struct.
//!
//! # Invariants
//! - A missing config file yields defaults; a malformed one is an error.
//! - Environment values win over file values.

use crate::evernote::EvernoteOptions;
use crate::github::GistClientOptions;
use crate::logging::LogOptions;
use crate::sync::orchestrator::SyncOptions;
use crate::webdriver::WebDriverOptions;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "GISTNOTE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "gistnote.toml";

static HTTP_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/]+").expect("valid url regex"));
static GUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("valid guid regex")
});

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    InvalidEnv { key: &'static str, value: String },
    Invalid { field: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse {}: {source}", path.display())
            }
            Self::InvalidEnv { key, value } => write!(f, "invalid {key}=`{value}`"),
            Self::Invalid { field, reason } => write!(f, "invalid config `{field}`: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Directory holding `ledger.json` and `ledger_env.json`.
    pub state_dir: PathBuf,
    pub github: GithubConfig,
    pub evernote: EvernoteConfig,
    pub browser: BrowserConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GithubConfig {
    pub token: String,
    pub graphql_url: String,
    pub gist_base_url: String,
    pub page_size: u32,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvernoteConfig {
    pub token: String,
    pub note_store_url: String,
    pub notebook_guid: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub settle_delay_ms: u64,
    pub ready_timeout_ms: u64,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    /// Defaults to `<state_dir>/logs`.
    pub dir: Option<PathBuf>,
    pub stderr: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".gistnote"),
            github: GithubConfig::default(),
            evernote: EvernoteConfig::default(),
            browser: BrowserConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            graphql_url: "https://api.github.com/graphql".to_string(),
            gist_base_url: "https://gist.github.com".to_string(),
            page_size: 100,
            timeout_ms: 30_000,
        }
    }
}

impl Default for EvernoteConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            note_store_url: String::new(),
            notebook_guid: None,
            timeout_ms: 60_000,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            window_width: 1200,
            window_height: 1373,
            settle_delay_ms: 200,
            ready_timeout_ms: 2_000,
            timeout_ms: 60_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            dir: None,
            stderr: true,
        }
    }
}

/// `$GISTNOTE_CONFIG` when set, otherwise `./gistnote.toml`.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Reads one TOML file; `Ok(None)` when it does not exist.
pub fn load_file(path: &Path) -> ConfigResult<Option<SyncConfig>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Loads file + environment layers and validates the result.
pub fn load() -> ConfigResult<SyncConfig> {
    let mut config = load_file(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

pub fn apply_env_overrides(config: &mut SyncConfig) -> ConfigResult<()> {
    apply_env_overrides_from(config, |key| std::env::var(key).ok())
}

fn apply_env_overrides_from<F>(config: &mut SyncConfig, mut lookup: F) -> ConfigResult<()>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut text = |key: &'static str| {
        lookup(key)
            .map(|raw| raw.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| (key, value))
    };

    if let Some((_, value)) = text("GISTNOTE_STATE_DIR") {
        config.state_dir = PathBuf::from(value);
    }
    if let Some((_, value)) = text("GISTNOTE_GITHUB_TOKEN") {
        config.github.token = value;
    }
    if let Some((_, value)) = text("GISTNOTE_GITHUB_GRAPHQL_URL") {
        config.github.graphql_url = value;
    }
    if let Some((_, value)) = text("GISTNOTE_GIST_BASE_URL") {
        config.github.gist_base_url = value;
    }
    if let Some((key, value)) = text("GISTNOTE_PAGE_SIZE") {
        config.github.page_size = parse_env(key, value)?;
    }
    if let Some((_, value)) = text("GISTNOTE_EVERNOTE_TOKEN") {
        config.evernote.token = value;
    }
    if let Some((_, value)) = text("GISTNOTE_NOTE_STORE_URL") {
        config.evernote.note_store_url = value;
    }
    if let Some((_, value)) = text("GISTNOTE_NOTEBOOK_GUID") {
        config.evernote.notebook_guid = Some(value);
    }
    if let Some((_, value)) = text("GISTNOTE_WEBDRIVER_URL") {
        config.browser.webdriver_url = value;
    }
    if let Some((key, value)) = text("GISTNOTE_HEADLESS") {
        config.browser.headless = parse_boolish(key, value)?;
    }
    if let Some((key, value)) = text("GISTNOTE_SETTLE_DELAY_MS") {
        config.browser.settle_delay_ms = parse_env(key, value)?;
    }
    if let Some((key, value)) = text("GISTNOTE_READY_TIMEOUT_MS") {
        config.browser.ready_timeout_ms = parse_env(key, value)?;
    }
    if let Some((_, value)) = text("GISTNOTE_LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Some((_, value)) = text("GISTNOTE_LOG_DIR") {
        config.logging.dir = Some(PathBuf::from(value));
    }
    if let Some((key, value)) = text("GISTNOTE_LOG_STDERR") {
        config.logging.stderr = parse_boolish(key, value)?;
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> ConfigResult<T> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}

fn parse_boolish(key: &'static str, value: String) -> ConfigResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv { key, value }),
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn require_http_url(field: &'static str, value: &str) -> ConfigResult<()> {
    if HTTP_URL_RE.is_match(value) {
        Ok(())
    } else {
        Err(invalid(field, format!("expected an http(s) URL, got `{value}`")))
    }
}

fn require_token(field: &'static str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        Err(invalid(field, "token is required"))
    } else {
        Ok(())
    }
}

impl SyncConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.state_dir.as_os_str().is_empty() {
            return Err(invalid("state_dir", "path is empty"));
        }

        require_token("github.token", &self.github.token)?;
        require_http_url("github.graphql_url", &self.github.graphql_url)?;
        require_http_url("github.gist_base_url", &self.github.gist_base_url)?;
        if !(1..=100).contains(&self.github.page_size) {
            return Err(invalid("github.page_size", "must be within 1..=100"));
        }

        require_token("evernote.token", &self.evernote.token)?;
        require_http_url("evernote.note_store_url", &self.evernote.note_store_url)?;
        if let Some(guid) = &self.evernote.notebook_guid {
            if !GUID_RE.is_match(guid) {
                return Err(invalid(
                    "evernote.notebook_guid",
                    format!("`{guid}` is not a GUID"),
                ));
            }
        }

        require_http_url("browser.webdriver_url", &self.browser.webdriver_url)?;
        if self.browser.window_width == 0 || self.browser.window_height == 0 {
            return Err(invalid("browser.window_*", "window size must be non-zero"));
        }
        if self.browser.ready_timeout_ms == 0 {
            return Err(invalid("browser.ready_timeout_ms", "must be non-zero"));
        }
        Ok(())
    }

    /// Log directory made absolute against the working directory.
    pub fn resolved_log_dir(&self) -> std::io::Result<PathBuf> {
        let dir = self
            .logging
            .dir
            .clone()
            .unwrap_or_else(|| self.state_dir.join("logs"));
        std::path::absolute(dir)
    }

    pub fn log_options(&self) -> std::io::Result<LogOptions> {
        Ok(LogOptions {
            level: self.logging.level.clone(),
            log_dir: self.resolved_log_dir()?,
            echo_stderr: self.logging.stderr,
        })
    }

    pub fn gist_client_options(&self) -> GistClientOptions {
        GistClientOptions {
            token: self.github.token.clone(),
            graphql_url: self.github.graphql_url.clone(),
            gist_base_url: self.github.gist_base_url.clone(),
            page_size: self.github.page_size,
            timeout: Duration::from_millis(self.github.timeout_ms),
        }
    }

    pub fn evernote_options(&self) -> EvernoteOptions {
        EvernoteOptions {
            token: self.evernote.token.clone(),
            note_store_url: self.evernote.note_store_url.clone(),
            timeout: Duration::from_millis(self.evernote.timeout_ms),
        }
    }

    pub fn webdriver_options(&self) -> WebDriverOptions {
        WebDriverOptions {
            server_url: self.browser.webdriver_url.clone(),
            headless: self.browser.headless,
            window_width: self.browser.window_width,
            window_height: self.browser.window_height,
            timeout: Duration::from_millis(self.browser.timeout_ms),
        }
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            ready_timeout: Duration::from_millis(self.browser.ready_timeout_ms),
            settle_delay: Duration::from_millis(self.browser.settle_delay_ms),
            notebook_guid: self.evernote.notebook_guid.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_env_overrides_from, load_file, ConfigError, SyncConfig};
    use std::collections::HashMap;
    use std::time::Duration;

    fn valid() -> SyncConfig {
        let mut config = SyncConfig::default();
        config.github.token = "gh".to_string();
        config.evernote.token = "en".to_string();
        config.evernote.note_store_url = "https://www.evernote.com/shard/s1/notestore".to_string();
        config
    }

    fn env(pairs: &[(&str, &str)]) -> impl FnMut(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_capture_geometry() {
        let config = SyncConfig::default();
        assert_eq!(config.browser.window_width, 1200);
        assert_eq!(config.browser.window_height, 1373);
        assert_eq!(
            config.sync_options().settle_delay,
            Duration::from_millis(200)
        );
        assert_eq!(config.sync_options().ready_timeout, Duration::from_secs(2));
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_file(&dir.path().join("absent.toml")).unwrap().is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gistnote.toml");
        std::fs::write(
            &path,
            "state_dir = \"/var/lib/gistnote\"\n[github]\ntoken = \"abc\"\n[browser]\nheadless = false\n",
        )
        .unwrap();

        let config = load_file(&path).unwrap().unwrap();
        assert_eq!(config.github.token, "abc");
        assert_eq!(config.github.graphql_url, "https://api.github.com/graphql");
        assert!(!config.browser.headless);
        assert_eq!(config.browser.window_width, 1200);
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gistnote.toml");
        std::fs::write(&path, "[github]\ntokn = \"typo\"\n").unwrap();
        assert!(matches!(load_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn env_overrides_win() {
        let mut config = valid();
        apply_env_overrides_from(
            &mut config,
            env(&[
                ("GISTNOTE_GITHUB_TOKEN", " env-token "),
                ("GISTNOTE_HEADLESS", "off"),
                ("GISTNOTE_PAGE_SIZE", "25"),
                ("GISTNOTE_NOTE_STORE_URL", ""),
            ]),
        )
        .unwrap();

        assert_eq!(config.github.token, "env-token");
        assert!(!config.browser.headless);
        assert_eq!(config.github.page_size, 25);
        assert_eq!(
            config.evernote.note_store_url,
            "https://www.evernote.com/shard/s1/notestore"
        );
    }

    #[test]
    fn malformed_env_values_are_rejected() {
        let mut config = valid();
        let err =
            apply_env_overrides_from(&mut config, env(&[("GISTNOTE_PAGE_SIZE", "many")]))
                .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                key: "GISTNOTE_PAGE_SIZE",
                ..
            }
        ));
    }

    #[test]
    fn validation_rejects_missing_tokens_and_bad_urls() {
        assert!(valid().validate().is_ok());

        let mut config = valid();
        config.github.token = "  ".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("github.token"));

        let mut config = valid();
        config.browser.webdriver_url = "localhost:9515".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("browser.webdriver_url"));

        let mut config = valid();
        config.evernote.notebook_guid = Some("inbox".to_string());
        assert!(config.validate().is_err());

        let mut config = valid();
        config.evernote.notebook_guid = Some("3f1b2c4d-0a1b-4c2d-9e8f-112233445566".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn log_dir_defaults_under_state_dir() {
        let config = valid();
        let dir = config.resolved_log_dir().unwrap();
        assert!(dir.is_absolute());
        assert!(dir.ends_with(".gistnote/logs"));
    }
}
