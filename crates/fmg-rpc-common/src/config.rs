//! Connection configuration.
//!
//! Mirrors the connection settings the host framework hands the connector:
//! controller address, credentials, and TLS/verbosity flags.

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, ConnectorResult};

/// Port that is left implicit in the server host.
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// How the connector authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthMethod {
    /// Session login with username and password.
    #[default]
    #[serde(rename = "Username/Password")]
    UsernamePassword,
    /// Bearer API key.
    #[serde(rename = "API Key")]
    ApiKey,
}

/// Credentials selected by [`ConnectorConfig::credentials`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials<'a> {
    /// Username and password for a session login.
    UserPassword {
        /// Login name.
        username: &'a str,
        /// Login password.
        password: &'a str,
    },
    /// API key sent as a bearer token.
    ApiKey(&'a str),
}

/// Connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Controller address, with or without scheme.
    #[serde(default)]
    pub address: String,

    /// Controller HTTPS port.
    #[serde(default)]
    pub port: Option<u16>,

    /// Authentication method.
    #[serde(default)]
    pub auth_method: AuthMethod,

    /// Login name (username/password auth).
    #[serde(default)]
    pub username: Option<String>,

    /// Login password (username/password auth).
    #[serde(default)]
    pub password: Option<String>,

    /// API key (API key auth).
    #[serde(default)]
    pub api_key: Option<String>,

    /// Verify the controller's TLS certificate.
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    /// Log every request and response at debug level.
    #[serde(default)]
    pub debug_connection: bool,

    /// Ask the controller for verbose (string-valued) responses.
    #[serde(default = "default_verbose_json")]
    pub verbose_json: bool,
}

fn default_verify_ssl() -> bool {
    true
}

fn default_verbose_json() -> bool {
    true
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: None,
            auth_method: AuthMethod::default(),
            username: None,
            password: None,
            api_key: None,
            verify_ssl: default_verify_ssl(),
            debug_connection: false,
            verbose_json: default_verbose_json(),
        }
    }
}

impl ConnectorConfig {
    /// Returns `host[:port]` with any scheme and surrounding slashes removed.
    ///
    /// The port is appended unless it is absent or 443.
    ///
    /// ```
    /// use fmg_rpc_common::ConnectorConfig;
    ///
    /// let config = ConnectorConfig {
    ///     address: "https://fmg.example.com/".to_string(),
    ///     port: Some(8443),
    ///     ..Default::default()
    /// };
    /// assert_eq!(config.server_host(), "fmg.example.com:8443");
    /// ```
    pub fn server_host(&self) -> String {
        let host = self
            .address
            .trim_matches('/')
            .replace("http://", "")
            .replace("https://", "");

        match self.port {
            Some(port) if port != DEFAULT_HTTPS_PORT => format!("{}:{}", host, port),
            _ => host,
        }
    }

    /// Returns the credentials for the configured auth method.
    pub fn credentials(&self) -> ConnectorResult<Credentials<'_>> {
        match self.auth_method {
            AuthMethod::ApiKey => {
                let key = non_empty(self.api_key.as_deref())
                    .ok_or_else(|| ConnectorError::invalid_config("api_key", "API key is required"))?;
                Ok(Credentials::ApiKey(key))
            }
            AuthMethod::UsernamePassword => {
                let username = non_empty(self.username.as_deref()).ok_or_else(|| {
                    ConnectorError::invalid_config("username", "Username is required")
                })?;
                let password = self.password.as_deref().ok_or_else(|| {
                    ConnectorError::invalid_config("password", "Password is required")
                })?;
                Ok(Credentials::UserPassword { username, password })
            }
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.server_host().is_empty() {
            return Err(ConnectorError::invalid_config(
                "address",
                "Server address is required",
            ));
        }
        self.credentials()?;
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(address: &str, port: Option<u16>) -> ConnectorConfig {
        ConnectorConfig {
            address: address.to_string(),
            port,
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_server_host_strips_scheme() {
        assert_eq!(config("https://10.0.0.1", None).server_host(), "10.0.0.1");
        assert_eq!(config("http://10.0.0.1/", None).server_host(), "10.0.0.1");
        assert_eq!(config("/fmg.lab/", None).server_host(), "fmg.lab");
    }

    #[test]
    fn test_server_host_port() {
        assert_eq!(config("fmg.lab", Some(443)).server_host(), "fmg.lab");
        assert_eq!(config("fmg.lab", Some(10443)).server_host(), "fmg.lab:10443");
    }

    #[test]
    fn test_defaults() {
        let config = ConnectorConfig::default();
        assert!(config.verify_ssl);
        assert!(config.verbose_json);
        assert!(!config.debug_connection);
        assert_eq!(config.auth_method, AuthMethod::UsernamePassword);
    }

    #[test]
    fn test_credentials_user_password() {
        let config = config("fmg.lab", None);
        assert_eq!(
            config.credentials().unwrap(),
            Credentials::UserPassword {
                username: "admin",
                password: "secret"
            }
        );
    }

    #[test]
    fn test_credentials_api_key() {
        let config = ConnectorConfig {
            address: "fmg.lab".to_string(),
            auth_method: AuthMethod::ApiKey,
            api_key: Some("key-123".to_string()),
            ..Default::default()
        };
        assert_eq!(config.credentials().unwrap(), Credentials::ApiKey("key-123"));
    }

    #[test]
    fn test_missing_api_key() {
        let config = ConnectorConfig {
            address: "fmg.lab".to_string(),
            auth_method: AuthMethod::ApiKey,
            username: Some("admin".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConnectorError::InvalidConfig { ref field, .. }) if field == "api_key"
        ));
    }

    #[test]
    fn test_missing_address() {
        let config = config("", None);
        assert!(matches!(
            config.validate(),
            Err(ConnectorError::InvalidConfig { ref field, .. }) if field == "address"
        ));
    }

    #[test]
    fn test_deserialize_host_mapping() {
        let config: ConnectorConfig = serde_json::from_value(serde_json::json!({
            "address": "https://fmg.lab",
            "port": 443,
            "auth_method": "API Key",
            "api_key": "abc",
            "verify_ssl": false
        }))
        .unwrap();
        assert_eq!(config.auth_method, AuthMethod::ApiKey);
        assert!(!config.verify_ssl);
        assert!(config.verbose_json);
        assert_eq!(config.server_host(), "fmg.lab");
    }
}
