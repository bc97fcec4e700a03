//! Shared configuration for HomeServer tools.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), an
//! optional device template table, and translation to
//! `homeserver_core::SessionConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use homeserver_core::config::DEFAULT_PORT;
use homeserver_core::{DeviceTemplate, SessionConfig, TemplateTable};

const KEYRING_SERVICE: &str = "homeserver";
const PASSWORD_ENV: &str = "HOMESERVER_PASSWORD";
const USERNAME_ENV: &str = "HOMESERVER_USERNAME";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,

    /// Replaces the built-in device templates when present. Order matters:
    /// the first matching template classifies a device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<Vec<DeviceTemplate>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
            templates: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Seconds allowed for opening the socket.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Seconds allowed for the login handshake.
    #[serde(default = "default_login_timeout")]
    pub login_timeout: u64,

    /// Seconds allowed for the project download.
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,

    /// Milliseconds between reconnect attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            connect_timeout: default_connect_timeout(),
            login_timeout: default_login_timeout(),
            http_timeout: default_http_timeout(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_login_timeout() -> u64 {
    30
}
fn default_http_timeout() -> u64 {
    30
}
fn default_retry_delay_ms() -> u64 {
    3000
}

/// A named HomeServer profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Host name or IP address of the HomeServer.
    pub host: String,

    /// QUAD socket port (default 80).
    pub port: Option<u16>,

    /// Port serving the project file, if different from `port`.
    pub http_port: Option<u16>,

    pub username: Option<String>,

    /// Password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Override the default connect timeout (seconds).
    pub connect_timeout: Option<u64>,
}

impl Config {
    /// Look up a profile, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());

        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile)),
            None => Err(ConfigError::UnknownProfile { profile: name }),
        }
    }

    /// Effective template table.
    pub fn template_table(&self) -> TemplateTable {
        self.templates
            .clone()
            .map_or_else(TemplateTable::default, TemplateTable::from)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "homeserver", "homeserver").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("homeserver");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path` + environment.
///
/// Environment variables use a `HOMESERVER__` prefix and `__` as the
/// nesting separator, e.g. `HOMESERVER__DEFAULTS__RETRY_DELAY_MS=500`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HOMESERVER__").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the login name: profile, then `HOMESERVER_USERNAME`.
pub fn resolve_username(profile: &Profile, profile_name: &str) -> Result<String, ConfigError> {
    profile
        .username
        .clone()
        .or_else(|| std::env::var(USERNAME_ENV).ok())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })
}

/// Resolve the password from the credential chain.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. Global env var
    if let Ok(val) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(val));
    }

    // 3. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 4. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a password in the system keyring for `profile_name`.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

/// Build a `SessionConfig` from a profile and the global defaults.
pub fn profile_to_session_config(
    cfg: &Config,
    profile: &Profile,
    profile_name: &str,
) -> Result<SessionConfig, ConfigError> {
    if profile.host.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: format!("profile '{profile_name}' has no host"),
        });
    }

    let username = resolve_username(profile, profile_name)?;
    let password = resolve_password(profile, profile_name)?;
    let defaults = &cfg.defaults;

    Ok(SessionConfig {
        host: profile.host.trim().to_owned(),
        port: profile.port.unwrap_or(DEFAULT_PORT),
        http_port: profile.http_port,
        username,
        password,
        connect_timeout: Duration::from_secs(
            profile.connect_timeout.unwrap_or(defaults.connect_timeout),
        ),
        login_timeout: Duration::from_secs(defaults.login_timeout),
        http_timeout: Duration::from_secs(defaults.http_timeout),
        retry_delay: Duration::from_millis(defaults.retry_delay_ms),
        templates: cfg.template_table(),
    })
}
