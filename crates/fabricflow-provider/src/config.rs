//! Provider configuration
//!
//! Loaded from YAML or from `SF_*` environment variables, validated before any
//! network call, then turned into a [`FabricClient`].

use crate::error::{ProviderError, Result};
use fabricflow_client::{
    Authenticator, BearerAuthenticator, CertificateAuthenticator, ClientConfig, DEFAULT_API_VERSION,
    FabricClient, PollTimings, TokenSource,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    Certificate,
    Entra,
}

impl std::str::FromStr for AuthType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "certificate" => Ok(AuthType::Certificate),
            "entra" => Ok(AuthType::Entra),
            other => Err(ProviderError::InvalidConfig(format!(
                "auth_type: unsupported value {:?}, expected \"certificate\" or \"entra\"",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFeatures {
    /// Upgrade an application that already exists instead of failing its creation.
    #[serde(default)]
    pub application_recreate_on_upgrade: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub endpoint: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub skip_tls_verify: bool,
    #[serde(default)]
    pub auth_type: AuthType,
    /// PEM client certificate, optionally with its key appended. PKCS#12
    /// (`.pfx`/`.p12`) files are not loaded; convert them first with
    /// `openssl pkcs12 -in client.pfx -out client.pem -nodes`.
    #[serde(default)]
    pub client_certificate_path: Option<PathBuf>,
    /// Separate PEM private key for `client_certificate_path`.
    #[serde(default)]
    pub client_key_path: Option<PathBuf>,
    #[serde(default)]
    pub cluster_application_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub features: ProviderFeatures,
    /// Polling cadences. Not read from the environment.
    #[serde(skip)]
    pub timings: PollTimings,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ProviderConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_version: default_api_version(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            skip_tls_verify: false,
            auth_type: AuthType::default(),
            client_certificate_path: None,
            client_key_path: None,
            cluster_application_id: None,
            tenant_id: None,
            client_id: None,
            features: ProviderFeatures::default(),
            timings: PollTimings::default(),
        }
    }

    /// Create ProviderConfig from `SF_*` environment variables
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("SF_ENDPOINT")
            .map_err(|_| ProviderError::MissingEnvVar("SF_ENDPOINT".to_string()))?;
        let mut config = Self::new(endpoint);

        if let Some(v) = env_value("SF_API_VERSION") {
            config.api_version = v;
        }
        if let Some(v) = env_value("SF_TIMEOUT_SECS") {
            config.timeout_secs = v.parse().map_err(|_| {
                ProviderError::InvalidConfig(format!("timeout_secs: {:?} is not a number", v))
            })?;
        }
        if let Some(v) = env_value("SF_SKIP_TLS_VERIFY") {
            config.skip_tls_verify = parse_bool("skip_tls_verify", &v)?;
        }
        if let Some(v) = env_value("SF_AUTH_TYPE") {
            config.auth_type = v.parse()?;
        }
        config.client_certificate_path = env_value("SF_CLIENT_CERTIFICATE_PATH").map(PathBuf::from);
        config.client_key_path = env_value("SF_CLIENT_KEY_PATH").map(PathBuf::from);
        config.cluster_application_id = env_value("SF_CLUSTER_APPLICATION_ID");
        config.tenant_id = env_value("SF_TENANT_ID");
        config.client_id = env_value("SF_CLIENT_ID");
        if let Some(v) = env_value("SF_APPLICATION_RECREATE_ON_UPGRADE") {
            config.features.application_recreate_on_upgrade =
                parse_bool("features.application_recreate_on_upgrade", &v)?;
        }

        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub async fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self, has_token_source: bool) -> Result<()> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ProviderError::InvalidConfig("endpoint: must be set".to_string()));
        }
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(ProviderError::InvalidConfig(format!(
                "endpoint: {:?} must be an http(s) URL",
                endpoint
            )));
        }
        if self.api_version.trim().is_empty() {
            return Err(ProviderError::InvalidConfig("api_version: must not be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ProviderError::InvalidConfig(
                "timeout_secs: must be greater than zero".to_string(),
            ));
        }

        match self.auth_type {
            AuthType::Certificate => {
                let Some(path) = &self.client_certificate_path else {
                    return Err(ProviderError::InvalidConfig(
                        "client_certificate_path: required when auth_type is \"certificate\""
                            .to_string(),
                    ));
                };
                if is_pkcs12(path) {
                    return Err(ProviderError::InvalidConfig(format!(
                        "client_certificate_path: {} is PKCS#12; convert it to PEM with \
                         `openssl pkcs12 -in {} -out client.pem -nodes`",
                        path.display(),
                        path.display()
                    )));
                }
            }
            AuthType::Entra => {
                if self.cluster_application_id.as_deref().is_none_or(|id| id.trim().is_empty()) {
                    return Err(ProviderError::InvalidConfig(
                        "cluster_application_id: required when auth_type is \"entra\"".to_string(),
                    ));
                }
                if !has_token_source {
                    return Err(ProviderError::InvalidConfig(
                        "auth_type: \"entra\" requires a token source".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Validate, build the authenticator, and construct the client.
    pub fn build_client(&self, token_source: Option<Arc<dyn TokenSource>>) -> Result<FabricClient> {
        self.validate(token_source.is_some())?;

        let authenticator: Arc<dyn Authenticator> = match (self.auth_type, token_source) {
            (AuthType::Entra, Some(source)) => {
                let app_id = self.cluster_application_id.as_deref().unwrap_or_default();
                Arc::new(BearerAuthenticator::for_cluster_application(source, app_id.trim()))
            }
            (AuthType::Entra, None) => {
                return Err(ProviderError::InvalidConfig(
                    "auth_type: \"entra\" requires a token source".to_string(),
                ));
            }
            (AuthType::Certificate, _) => {
                let cert = self.client_certificate_path.as_deref().ok_or_else(|| {
                    ProviderError::InvalidConfig("client_certificate_path: must be set".to_string())
                })?;
                Arc::new(CertificateAuthenticator::from_files(
                    cert,
                    self.client_key_path.as_deref(),
                )?)
            }
        };

        let mut client_config = ClientConfig::new(self.endpoint.trim())
            .with_api_version(self.api_version.trim())
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_timings(self.timings.clone());
        client_config.skip_tls_verify = self.skip_tls_verify;

        tracing::debug!(
            endpoint = %self.endpoint,
            api_version = %self.api_version,
            auth_type = ?self.auth_type,
            "configuring cluster client"
        );
        Ok(FabricClient::new(client_config, Some(authenticator))?)
    }
}

fn is_pkcs12(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pfx") || ext.eq_ignore_ascii_case("p12"))
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(field: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ProviderError::InvalidConfig(format!(
            "{}: {:?} is not a boolean",
            field, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabricflow_client::StaticTokenSource;

    const ALL_VARS: [&str; 11] = [
        "SF_ENDPOINT",
        "SF_API_VERSION",
        "SF_TIMEOUT_SECS",
        "SF_SKIP_TLS_VERIFY",
        "SF_AUTH_TYPE",
        "SF_CLIENT_CERTIFICATE_PATH",
        "SF_CLIENT_KEY_PATH",
        "SF_CLUSTER_APPLICATION_ID",
        "SF_TENANT_ID",
        "SF_CLIENT_ID",
        "SF_APPLICATION_RECREATE_ON_UPGRADE",
    ];

    /// Every provider variable unset except the given overrides.
    fn env(overrides: &[(&'static str, &'static str)]) -> Vec<(&'static str, Option<&'static str>)> {
        ALL_VARS
            .iter()
            .map(|key| {
                let value = overrides.iter().find(|(k, _)| k == key).map(|(_, v)| *v);
                (*key, value)
            })
            .collect()
    }

    #[test]
    fn test_from_env_defaults() {
        temp_env::with_vars(env(&[("SF_ENDPOINT", "https://cluster:19080")]), || {
            let config = ProviderConfig::from_env().unwrap();
            assert_eq!(config.endpoint, "https://cluster:19080");
            assert_eq!(config.api_version, "6.0");
            assert_eq!(config.timeout_secs, 60);
            assert_eq!(config.auth_type, AuthType::Certificate);
            assert!(!config.features.application_recreate_on_upgrade);
        });
    }

    #[test]
    fn test_from_env_overrides() {
        let vars = env(&[
            ("SF_ENDPOINT", "https://cluster:19080"),
            ("SF_API_VERSION", "8.2"),
            ("SF_TIMEOUT_SECS", "15"),
            ("SF_AUTH_TYPE", "Entra"),
            ("SF_CLUSTER_APPLICATION_ID", "api://cluster"),
            ("SF_APPLICATION_RECREATE_ON_UPGRADE", "true"),
        ]);
        temp_env::with_vars(vars, || {
            let config = ProviderConfig::from_env().unwrap();
            assert_eq!(config.api_version, "8.2");
            assert_eq!(config.timeout_secs, 15);
            assert_eq!(config.auth_type, AuthType::Entra);
            assert_eq!(config.cluster_application_id.as_deref(), Some("api://cluster"));
            assert!(config.features.application_recreate_on_upgrade);
        });
    }

    #[test]
    fn test_from_env_missing_endpoint() {
        temp_env::with_vars(env(&[]), || {
            let err = ProviderConfig::from_env().unwrap_err();
            assert!(matches!(err, ProviderError::MissingEnvVar(ref v) if v == "SF_ENDPOINT"));
        });
    }

    #[test]
    fn test_from_env_rejects_bad_values() {
        let vars = env(&[
            ("SF_ENDPOINT", "https://cluster:19080"),
            ("SF_SKIP_TLS_VERIFY", "maybe"),
        ]);
        temp_env::with_vars(vars, || {
            assert!(matches!(
                ProviderConfig::from_env(),
                Err(ProviderError::InvalidConfig(_))
            ));
        });
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
endpoint: https://cluster:19080
auth_type: entra
cluster_application_id: api://cluster
features:
  application_recreate_on_upgrade: true
"#;
        let config = ProviderConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.auth_type, AuthType::Entra);
        assert_eq!(config.api_version, "6.0");
        assert_eq!(config.timeout_secs, 60);
        assert!(config.features.application_recreate_on_upgrade);
    }

    #[tokio::test]
    async fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provider.yaml");
        std::fs::write(
            &path,
            "endpoint: https://cluster:19080\nclient_certificate_path: /etc/sf/client.pem\ntimeout_secs: 30\n",
        )
        .unwrap();

        let config = ProviderConfig::from_yaml_file(&path).await.unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(
            config.client_certificate_path.as_deref(),
            Some(Path::new("/etc/sf/client.pem"))
        );
        assert!(config.validate(false).is_ok());

        let missing = ProviderConfig::from_yaml_file(&dir.path().join("absent.yaml")).await;
        assert!(matches!(missing, Err(ProviderError::Io(_))));
    }

    #[test]
    fn test_validate_certificate_requires_path() {
        let config = ProviderConfig::new("https://cluster:19080");
        let err = config.validate(false).unwrap_err();
        assert!(err.to_string().contains("client_certificate_path"));
    }

    #[test]
    fn test_validate_rejects_pkcs12_certificate() {
        for file in ["client.pfx", "client.P12"] {
            let mut config = ProviderConfig::new("https://cluster:19080");
            config.client_certificate_path = Some(PathBuf::from(file));
            let err = config.validate(false).unwrap_err();
            assert!(matches!(err, ProviderError::InvalidConfig(ref msg) if msg.contains("PKCS#12")));
        }

        let mut config = ProviderConfig::new("https://cluster:19080");
        config.client_certificate_path = Some(PathBuf::from("client.pem"));
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_validate_endpoint() {
        let mut config = ProviderConfig::new("cluster:19080");
        config.client_certificate_path = Some(PathBuf::from("client.pem"));
        assert!(config.validate(false).unwrap_err().to_string().contains("endpoint"));
    }

    #[test]
    fn test_entra_requires_token_source() {
        let mut config = ProviderConfig::new("https://cluster:19080");
        config.auth_type = AuthType::Entra;
        config.cluster_application_id = Some("api://cluster".into());
        assert!(config.build_client(None).is_err());

        let source: Arc<dyn TokenSource> = Arc::new(StaticTokenSource::new("token"));
        let client = config.build_client(Some(source)).unwrap();
        assert_eq!(client.api_version(), "6.0");
    }

    #[test]
    fn test_certificate_file_must_exist() {
        let mut config = ProviderConfig::new("https://cluster:19080");
        config.client_certificate_path = Some(PathBuf::from("/nonexistent/client.pem"));
        assert!(config.build_client(None).is_err());
    }
}
