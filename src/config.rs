//! Configuration types for the SOAP gateway.

use crate::error::ConfigError;
use crate::parser::{is_ncname, SOAP_11_NS, SOAP_ENV_PREFIX};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Environment variable carrying the service table as a JSON object.
pub const SERVICES_ENV_VAR: &str = "SOAP_SERVICES";

/// Main configuration for the SOAP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Config version
    pub version: String,

    /// General settings
    pub settings: SettingsConfig,

    /// Default identity used when a service does not name its own
    pub credentials: CredentialsConfig,

    /// Key material for signed security headers
    pub keystore: KeystoreConfig,

    /// Security header policy for this deployment
    pub security: SecurityConfig,

    /// Registered backend services, keyed by service name
    pub services: HashMap<String, ServiceConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: SettingsConfig::default(),
            credentials: CredentialsConfig::default(),
            keystore: KeystoreConfig::default(),
            security: SecurityConfig::default(),
            services: HashMap::new(),
        }
    }
}

impl GatewayConfig {
    /// Parse a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load configuration from a YAML file, merge services from the
    /// environment and validate the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.merge_services_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Merge services from [`SERVICES_ENV_VAR`] if it is set.
    pub fn merge_services_env(&mut self) -> Result<(), ConfigError> {
        match std::env::var(SERVICES_ENV_VAR) {
            Ok(json) if !json.trim().is_empty() => self.merge_services_json(&json),
            _ => Ok(()),
        }
    }

    /// Merge a JSON object of `name -> ServiceConfig`. Entries replace
    /// file-provided services with the same name.
    pub fn merge_services_json(&mut self, json: &str) -> Result<(), ConfigError> {
        let services: HashMap<String, ServiceConfig> = serde_json::from_str(json)?;
        self.services.extend(services);
        Ok(())
    }

    /// Validate every registered service.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, service) in &self.services {
            service.validate(name)?;
        }
        Ok(())
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Address the HTTP entry point binds to
    pub listen_address: String,

    /// Upper bound for one backend send/receive (milliseconds)
    pub request_timeout_ms: u64,

    /// Upper bound for establishing the backend connection (milliseconds)
    pub connect_timeout_ms: u64,

    /// User-Agent sent to backends
    pub user_agent: String,

    /// Maximum caller payload accepted by the HTTP entry point (bytes)
    pub max_body_size: usize,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8080".to_string(),
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            user_agent: format!("zentinel-soap-gateway/{}", env!("CARGO_PKG_VERSION")),
            max_body_size: 1_048_576, // 1MB
        }
    }
}

impl SettingsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Default username/password for security headers.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub username: String,
    pub password: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            username: "test".to_string(),
            password: "test123".to_string(),
        }
    }
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Keystore location and access parameters.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoreConfig {
    /// `file:/path` for a filesystem location, otherwise a path relative
    /// to `resource_root`
    pub path: String,

    /// Keystore password (also decrypts encrypted PKCS#8 entries)
    pub password: String,

    /// Alias of the signing key inside the keystore
    pub alias: String,

    /// Root directory for non-`file:` locations
    pub resource_root: PathBuf,
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            path: "keystore".to_string(),
            password: String::new(),
            alias: "gateway".to_string(),
            resource_root: PathBuf::from("."),
        }
    }
}

impl fmt::Debug for KeystoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeystoreConfig")
            .field("path", &self.path)
            .field("password", &"<redacted>")
            .field("alias", &self.alias)
            .field("resource_root", &self.resource_root)
            .finish()
    }
}

/// Security header configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Which header policy this deployment uses
    pub policy: SecurityPolicyKind,
}

/// Security header policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicyKind {
    /// SHA-1 digest of a UserInfo token, signed with an RSA key from the keystore
    #[default]
    Signed,
    /// UsernameToken with nonce, password digest and Timestamp
    UsernameToken,
}

/// Per-service dispatch and security parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Backend endpoint
    pub url: String,

    /// Attach a security header to outbound requests
    pub header_required: bool,

    /// Tag opening the caller-supplied fragment
    pub start_tag: String,

    /// Tag closing the caller-supplied fragment
    pub end_tag: String,

    /// Default namespace of the re-wrapped request element
    pub request_namespace: String,

    /// Extra namespace declared on the envelope
    pub envelope_namespace: Option<String>,

    /// Prefix for `envelope_namespace` (defaults to `soap`)
    pub envelope_prefix: Option<String>,

    /// Extra namespace declared on the body
    pub body_namespace: Option<String>,

    /// Prefix for `body_namespace`
    pub body_prefix: Option<String>,

    /// Default SOAP action
    pub soap_action: String,

    /// Username for the signed UserInfo token
    pub username: Option<String>,

    /// Correlation value for the signed UserInfo token
    pub correlation: Option<String>,

    /// Route this service through an HTTP proxy
    pub proxy_enabled: bool,

    pub proxy_host: Option<String>,

    pub proxy_port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            header_required: false,
            start_tag: "<Add>".to_string(),
            end_tag: "</Add>".to_string(),
            request_namespace: "http://tempuri.org/".to_string(),
            envelope_namespace: Some(SOAP_11_NS.to_string()),
            envelope_prefix: None,
            body_namespace: None,
            body_prefix: Some("soap".to_string()),
            soap_action: "http://tempuri.org/Add".to_string(),
            username: None,
            correlation: None,
            proxy_enabled: false,
            proxy_host: None,
            proxy_port: 0,
        }
    }
}

impl ServiceConfig {
    /// Proxy endpoint, if proxying is enabled and fully specified.
    pub fn proxy(&self) -> Option<(&str, u16)> {
        if !self.proxy_enabled {
            return None;
        }
        match self.proxy_host.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() && self.proxy_port > 0 => Some((host, self.proxy_port)),
            _ => None,
        }
    }

    /// Prefix used for the extra envelope namespace declaration.
    pub fn effective_envelope_prefix(&self) -> &str {
        self.envelope_prefix.as_deref().unwrap_or("soap")
    }

    /// Prefix used for the extra body namespace declaration.
    pub fn effective_body_prefix(&self) -> &str {
        self.body_prefix.as_deref().unwrap_or("soap")
    }

    /// Check the service for values that can never produce a request.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidService {
            service: name.to_string(),
            reason,
        };

        if self.url.trim().is_empty() {
            return Err(invalid("url must not be empty".to_string()));
        }
        if self.start_tag.trim().is_empty() || self.end_tag.trim().is_empty() {
            return Err(invalid("start_tag and end_tag must not be empty".to_string()));
        }
        for (kind, prefix) in [
            ("envelope_prefix", &self.envelope_prefix),
            ("body_prefix", &self.body_prefix),
        ] {
            if let Some(prefix) = prefix {
                let reserved = prefix.eq_ignore_ascii_case("xml") || prefix.eq_ignore_ascii_case("xmlns");
                if reserved || !is_ncname(prefix) {
                    return Err(invalid(format!(
                        "{} '{}' is not a usable namespace prefix",
                        kind, prefix
                    )));
                }
            }
        }
        if let Some(ns) = &self.envelope_namespace {
            if self.effective_envelope_prefix() == SOAP_ENV_PREFIX && ns != SOAP_11_NS {
                return Err(invalid(format!(
                    "envelope prefix '{}' is reserved for {}",
                    SOAP_ENV_PREFIX, SOAP_11_NS
                )));
            }
        }
        if let Some(ns) = &self.body_namespace {
            if self.effective_body_prefix() == SOAP_ENV_PREFIX && ns != SOAP_11_NS {
                return Err(invalid(format!(
                    "body prefix '{}' is reserved for {}",
                    SOAP_ENV_PREFIX, SOAP_11_NS
                )));
            }
        }
        if self.proxy_enabled && self.proxy().is_none() {
            warn!(
                service = %name,
                proxy_host = ?self.proxy_host,
                proxy_port = self.proxy_port,
                "Proxy enabled without a usable host/port, requests will go direct"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.security.policy, SecurityPolicyKind::Signed);
        assert_eq!(config.credentials.username, "test");
        assert!(config.services.is_empty());
        assert_eq!(config.settings.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_service_defaults() {
        let service = ServiceConfig::default();
        assert_eq!(service.start_tag, "<Add>");
        assert_eq!(service.end_tag, "</Add>");
        assert_eq!(service.request_namespace, "http://tempuri.org/");
        assert_eq!(service.soap_action, "http://tempuri.org/Add");
        assert_eq!(service.effective_body_prefix(), "soap");
        assert!(!service.header_required);
    }

    #[test]
    fn test_config_serialization() {
        let mut config = GatewayConfig::default();
        config.services.insert(
            "addService".to_string(),
            ServiceConfig {
                url: "http://backend/calc".to_string(),
                ..Default::default()
            },
        );
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = GatewayConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.services["addService"], config.services["addService"]);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
version: "1"
settings:
  request_timeout_ms: 5000
credentials:
  username: gateway
  password: secret
keystore:
  path: "file:/etc/gateway/keys"
  password: changeit
  alias: signer
security:
  policy: username_token
services:
  addService:
    url: "http://calc.example.org/calculator.asmx"
    header_required: true
    start_tag: "<Add>"
    end_tag: "</Add>"
    proxy_enabled: true
    proxy_host: "proxy.internal"
    proxy_port: 3128
"#;
        let config = GatewayConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.settings.request_timeout_ms, 5000);
        assert_eq!(config.credentials.username, "gateway");
        assert_eq!(config.keystore.alias, "signer");
        assert_eq!(config.security.policy, SecurityPolicyKind::UsernameToken);

        let service = &config.services["addService"];
        assert!(service.header_required);
        assert_eq!(service.proxy(), Some(("proxy.internal", 3128)));
        // unspecified fields keep their defaults
        assert_eq!(service.request_namespace, "http://tempuri.org/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_services_json_overrides() {
        let mut config = GatewayConfig::default();
        config.services.insert(
            "addService".to_string(),
            ServiceConfig {
                url: "http://old".to_string(),
                ..Default::default()
            },
        );
        config
            .merge_services_json(r#"{"addService": {"url": "http://new"}, "other": {"url": "http://other"}}"#)
            .unwrap();
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services["addService"].url, "http://new");
    }

    #[test]
    fn test_proxy_requires_host_and_port() {
        let mut service = ServiceConfig {
            url: "http://backend".to_string(),
            proxy_enabled: true,
            proxy_host: Some("proxy".to_string()),
            proxy_port: 0,
            ..Default::default()
        };
        assert_eq!(service.proxy(), None);
        service.proxy_port = 8080;
        assert_eq!(service.proxy(), Some(("proxy", 8080)));
        service.proxy_enabled = false;
        assert_eq!(service.proxy(), None);
        service.proxy_enabled = true;
        service.proxy_host = Some("  ".to_string());
        assert_eq!(service.proxy(), None);
    }

    #[test]
    fn test_validate_rejects_empty_url() {
        let service = ServiceConfig::default();
        assert!(matches!(
            service.validate("svc"),
            Err(ConfigError::InvalidService { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_reserved_prefix() {
        let service = ServiceConfig {
            url: "http://backend".to_string(),
            body_namespace: Some("urn:other".to_string()),
            body_prefix: Some(SOAP_ENV_PREFIX.to_string()),
            ..Default::default()
        };
        assert!(service.validate("svc").is_err());
    }

    #[test]
    fn test_validate_rejects_empty_prefix() {
        let service = ServiceConfig {
            url: "http://calc.example.org/".to_string(),
            envelope_prefix: Some(String::new()),
            ..Default::default()
        };
        assert!(service.validate("svc").is_err());
    }

    #[test]
    fn test_validate_rejects_xmlns_prefix() {
        let service = ServiceConfig {
            url: "http://calc.example.org/".to_string(),
            body_namespace: Some("urn:x".to_string()),
            body_prefix: Some("xmlns".to_string()),
            ..Default::default()
        };
        assert!(service.validate("svc").is_err());
    }

    #[test]
    fn test_validate_rejects_xml_prefix() {
        let service = ServiceConfig {
            url: "http://calc.example.org/".to_string(),
            envelope_prefix: Some("xml".to_string()),
            ..Default::default()
        };
        assert!(service.validate("svc").is_err());
    }

    #[test]
    fn test_validate_rejects_non_ncname_prefix() {
        for prefix in ["1ns", "a:b", "has space", "-x"] {
            let service = ServiceConfig {
                url: "http://calc.example.org/".to_string(),
                body_prefix: Some(prefix.to_string()),
                ..Default::default()
            };
            assert!(service.validate("svc").is_err(), "prefix {:?} accepted", prefix);
        }
    }

    #[test]
    fn test_validate_accepts_ordinary_prefixes() {
        let service = ServiceConfig {
            url: "http://calc.example.org/".to_string(),
            envelope_prefix: Some("env".to_string()),
            body_namespace: Some("http://tempuri.org/".to_string()),
            body_prefix: Some("tem_1.a-b".to_string()),
            ..Default::default()
        };
        assert!(service.validate("svc").is_ok());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let debug = format!("{:?}", CredentialsConfig::default());
        assert!(debug.contains("test"));
        assert!(!debug.contains("test123"));
    }
}
