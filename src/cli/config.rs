use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    net::{IpAddr, Ipv4Addr},
    path::Path,
    str::FromStr,
};

use crate::api::connection::{
    ConnectionConfig, DEFAULT_MAX_RETRY_COUNT, DEFAULT_PORT, DEFAULT_RECEIVE_TIMEOUT_MS,
    DEFAULT_RETRY_INTERVAL_MS, DEFAULT_SEND_TIMEOUT_MS, DEFAULT_SLAVE_ID,
};

/// Settings file looked up in the working directory when no path is given
pub const DEFAULT_SETTINGS_FILE: &str = "appsettings.json";

/// A settings value written either as a number or as a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Number(i64),
    Text(String),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Number(n) => write!(f, "{n}"),
            SettingValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// The `AppSettings` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppSettings {
    #[serde(rename = "SlaveIPAddress", alias = "SlaveIpAddress", default)]
    pub slave_ip_address: Option<SettingValue>,
    #[serde(default)]
    pub slave_tcp_port: Option<SettingValue>,
    #[serde(default)]
    pub slave_id: Option<SettingValue>,
    #[serde(default)]
    pub max_retry_count: Option<SettingValue>,
    /// Milliseconds between connect attempts
    #[serde(default)]
    pub retry_interval: Option<SettingValue>,
    /// Milliseconds
    #[serde(default)]
    pub send_timeout: Option<SettingValue>,
    /// Milliseconds
    #[serde(default)]
    pub receive_timeout: Option<SettingValue>,
}

/// Root of the settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "AppSettings", default)]
    pub app_settings: AppSettings,
}

/// Read `value` as `T`, falling back to `default` when absent or unparsable.
fn get_or_default<T>(value: Option<&SettingValue>, key: &str, default: T) -> T
where
    T: FromStr + fmt::Display,
{
    let Some(value) = value else {
        return default;
    };
    match value.to_string().trim().parse::<T>() {
        Ok(parsed) => parsed,
        Err(_) => {
            log::warn!("Invalid value '{value}' for setting {key}, using default {default}");
            default
        }
    }
}

impl Settings {
    /// Parse a JSON settings document
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).context("Failed to parse JSON settings")
    }

    /// Parse a TOML settings document
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("Failed to parse TOML settings")
    }

    /// Read settings from a file; the format follows the extension (`.toml` or JSON)
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::from_toml(&content)
        } else {
            Self::from_json(&content)
        }
        .with_context(|| format!("Invalid settings file {}", path.display()))
    }

    /// Load the explicit `path`, or the default file if it exists
    ///
    /// An explicitly requested file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_SETTINGS_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    log::info!("No {DEFAULT_SETTINGS_FILE} found, using default settings");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Initial connection configuration, each field defaulted independently
    pub fn connection_config(&self) -> ConnectionConfig {
        let s = &self.app_settings;
        let max_retry_count = get_or_default(
            s.max_retry_count.as_ref(),
            "MaxRetryCount",
            DEFAULT_MAX_RETRY_COUNT,
        );
        if max_retry_count == 0 {
            log::warn!("MaxRetryCount must be at least 1, using 1");
        }

        ConnectionConfig {
            address: get_or_default(
                s.slave_ip_address.as_ref(),
                "SlaveIPAddress",
                IpAddr::V4(Ipv4Addr::LOCALHOST),
            ),
            port: get_or_default(s.slave_tcp_port.as_ref(), "SlaveTcpPort", DEFAULT_PORT),
            slave_id: get_or_default(s.slave_id.as_ref(), "SlaveId", DEFAULT_SLAVE_ID),
            max_retry_count: max_retry_count.max(1),
            retry_interval_ms: get_or_default(
                s.retry_interval.as_ref(),
                "RetryInterval",
                DEFAULT_RETRY_INTERVAL_MS,
            ),
            send_timeout_ms: get_or_default(
                s.send_timeout.as_ref(),
                "SendTimeout",
                DEFAULT_SEND_TIMEOUT_MS,
            ),
            receive_timeout_ms: get_or_default(
                s.receive_timeout.as_ref(),
                "ReceiveTimeout",
                DEFAULT_RECEIVE_TIMEOUT_MS,
            ),
        }
    }
}
