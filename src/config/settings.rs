//! Configuration settings for the gateway.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::auth::TokenGrant;
use crate::error::GatewayError;
use crate::guard::{DEFAULT_REQUIRED_FIELDS, DEFAULT_VALIDITY_WINDOW_SECS};
use crate::hooks::HookSpec;
use crate::protocol::{is_valid_jsonp_callback, FilterKind, ResponseType};

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub socket: SocketConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub response: ResponseConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub hooks: Vec<HookSpec>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Socket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    /// Path to the Unix socket file.
    pub path: PathBuf,
    /// Socket file permissions (e.g., "0660").
    #[serde(default = "default_socket_permissions")]
    pub permissions: String,
}

/// Signature scheme selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SchemeConfig {
    #[default]
    #[serde(rename = "md5")]
    Md5,
    #[serde(rename = "hmac-sha256")]
    HmacSha256,
}

/// Request gate configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GuardConfig {
    /// Run the gate for actions that require login.
    #[serde(default = "default_true")]
    pub check_parameters: bool,
    /// Parameter carrying the signature; excluded from the signed payload.
    #[serde(default = "default_signature_field")]
    pub signature_field: String,
    /// Parameters that must be present and non-empty.
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<String>,
    /// Signature validity and replay window in seconds.
    #[serde(default = "default_validity_window")]
    pub validity_window_seconds: u64,
    #[serde(default)]
    pub scheme: SchemeConfig,
    /// Shared secret file, required for `hmac-sha256`.
    #[serde(default)]
    pub hmac_secret_path: Option<PathBuf>,
    /// How often expired replay keys are purged.
    #[serde(default = "default_replay_cleanup_interval")]
    pub replay_cleanup_interval_seconds: u64,
}

/// Actions exempt from login or from permission checks.
///
/// Entries are action names, `controller/action` paths, or `*`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub no_need_login: Vec<String>,
    #[serde(default)]
    pub no_need_right: Vec<String>,
}

/// Token table for the bundled auth store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<TokenGrant>,
}

/// Response rendering configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseConfig {
    #[serde(default)]
    pub default_type: ResponseType,
    /// Request parameter that names a JSONP callback.
    #[serde(default = "default_jsonp_handler")]
    pub jsonp_handler: String,
    /// Callback used when the requested one is not an identifier.
    #[serde(default = "default_jsonp_callback")]
    pub default_jsonp_callback: String,
}

/// Input filtering configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_filters")]
    pub filters: Vec<FilterKind>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Limits configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum frame size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Maximum concurrent connections.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    /// Socket read/write timeout in seconds.
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_seconds: u64,
}

// Default value functions
fn default_socket_permissions() -> String {
    "0660".to_string()
}

fn default_true() -> bool {
    true
}

fn default_signature_field() -> String {
    "signature".to_string()
}

fn default_required_fields() -> Vec<String> {
    DEFAULT_REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect()
}

fn default_validity_window() -> u64 {
    DEFAULT_VALIDITY_WINDOW_SECS
}

fn default_replay_cleanup_interval() -> u64 {
    60
}

fn default_jsonp_handler() -> String {
    "callback".to_string()
}

fn default_jsonp_callback() -> String {
    "jsonpReturn".to_string()
}

fn default_filters() -> Vec<FilterKind> {
    vec![
        FilterKind::Trim,
        FilterKind::StripTags,
        FilterKind::Htmlspecialchars,
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_max_message_size() -> usize {
    1_048_576 // 1MB
}

fn default_max_concurrent() -> usize {
    100
}

fn default_socket_timeout() -> u64 {
    30
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            check_parameters: default_true(),
            signature_field: default_signature_field(),
            required_fields: default_required_fields(),
            validity_window_seconds: default_validity_window(),
            scheme: SchemeConfig::default(),
            hmac_secret_path: None,
            replay_cleanup_interval_seconds: default_replay_cleanup_interval(),
        }
    }
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            default_type: ResponseType::default(),
            jsonp_handler: default_jsonp_handler(),
            default_jsonp_callback: default_jsonp_callback(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            filters: default_filters(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            max_concurrent_requests: default_max_concurrent(),
            socket_timeout_seconds: default_socket_timeout(),
        }
    }
}

impl Settings {
    /// Settings with every section at its default and the given socket path.
    pub fn with_socket_path(path: impl Into<PathBuf>) -> Self {
        Self {
            socket: SocketConfig {
                path: path.into(),
                permissions: default_socket_permissions(),
            },
            guard: GuardConfig::default(),
            access: AccessConfig::default(),
            auth: AuthConfig::default(),
            response: ResponseConfig::default(),
            input: InputConfig::default(),
            hooks: Vec::new(),
            logging: LoggingConfig::default(),
            limits: LimitsConfig::default(),
        }
    }

    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| GatewayError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            GatewayError::Config { message } => GatewayError::Config {
                message: format!("{} ({})", message, path.display()),
            },
            other => other,
        })
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, GatewayError> {
        let settings: Settings = toml::from_str(content).map_err(|e| GatewayError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(GatewayError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(GatewayError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        if self.socket.permissions.is_empty()
            || !self.socket.permissions.chars().all(|c| ('0'..='7').contains(&c))
        {
            return Err(GatewayError::Config {
                message: format!(
                    "Invalid socket permissions '{}'. Must be octal (e.g., '0660')",
                    self.socket.permissions
                ),
            });
        }

        if self.guard.validity_window_seconds == 0 {
            return Err(GatewayError::Config {
                message: "guard.validity_window_seconds must be greater than zero".to_string(),
            });
        }

        if self.guard.replay_cleanup_interval_seconds == 0 {
            return Err(GatewayError::Config {
                message: "guard.replay_cleanup_interval_seconds must be greater than zero"
                    .to_string(),
            });
        }

        if self.limits.max_concurrent_requests == 0 {
            return Err(GatewayError::Config {
                message: "limits.max_concurrent_requests must be greater than zero".to_string(),
            });
        }

        if self.guard.signature_field.trim().is_empty() {
            return Err(GatewayError::Config {
                message: "guard.signature_field must not be empty".to_string(),
            });
        }

        if self.guard.scheme == SchemeConfig::HmacSha256 && self.guard.hmac_secret_path.is_none() {
            return Err(GatewayError::Config {
                message: "guard.hmac_secret_path is required for the hmac-sha256 scheme"
                    .to_string(),
            });
        }

        if !is_valid_jsonp_callback(&self.response.default_jsonp_callback) {
            return Err(GatewayError::Config {
                message: format!(
                    "Invalid default JSONP callback '{}'",
                    self.response.default_jsonp_callback
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookFilter;

    #[test]
    fn test_default_values() {
        assert_eq!(default_socket_permissions(), "0660");
        assert_eq!(default_log_level(), "info");
        assert_eq!(default_log_format(), "pretty");
        assert_eq!(default_validity_window(), 500);
        assert_eq!(
            default_required_fields(),
            vec!["timestamp", "token", "signature", "nonce"]
        );
    }

    #[test]
    fn test_minimal_config() {
        let settings = Settings::from_toml_str(
            r#"
            [socket]
            path = "/run/apigate/gateway.sock"
            "#,
        )
        .unwrap();

        assert!(settings.guard.check_parameters);
        assert_eq!(settings.guard.signature_field, "signature");
        assert_eq!(settings.guard.scheme, SchemeConfig::Md5);
        assert_eq!(settings.response.default_type, ResponseType::Json);
        assert_eq!(settings.input.filters.len(), 3);
        assert!(settings.hooks.is_empty());
    }

    #[test]
    fn test_full_config() {
        let settings = Settings::from_toml_str(
            r#"
            [socket]
            path = "/tmp/gw.sock"
            permissions = "0600"

            [guard]
            validity_window_seconds = 120
            scheme = "hmac-sha256"
            hmac_secret_path = "/etc/apigate/hmac.key"

            [access]
            no_need_login = ["ping"]
            no_need_right = ["echo"]

            [[auth.tokens]]
            token = "abc"
            user_id = "7"
            rules = ["index/*"]

            [response]
            default_type = "xml"

            [input]
            filters = ["trim"]

            [[hooks]]
            method = "log_action"
            except = "ping,status"

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(settings.guard.validity_window_seconds, 120);
        assert_eq!(settings.guard.scheme, SchemeConfig::HmacSha256);
        assert_eq!(settings.access.no_need_login, vec!["ping"]);
        assert_eq!(settings.auth.tokens[0].user_id, "7");
        assert_eq!(settings.response.default_type, ResponseType::Xml);
        assert_eq!(settings.input.filters, vec![FilterKind::Trim]);
        assert_eq!(
            settings.hooks[0].filter,
            HookFilter::Except(vec!["ping".to_string(), "status".to_string()])
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            "[socket]\npath = \"/tmp/s\"\npermissions = \"rw-rw----\"",
            "[socket]\npath = \"/tmp/s\"\n[logging]\nlevel = \"loud\"",
            "[socket]\npath = \"/tmp/s\"\n[guard]\nvalidity_window_seconds = 0",
            "[socket]\npath = \"/tmp/s\"\n[guard]\nscheme = \"hmac-sha256\"",
            "[socket]\npath = \"/tmp/s\"\n[input]\nfilters = [\"rot13\"]",
        ];

        for case in cases {
            assert!(
                matches!(Settings::from_toml_str(case), Err(GatewayError::Config { .. })),
                "expected config error for: {}",
                case
            );
        }
    }
}
