//! Credentials for the cluster management endpoint
//!
//! An [`Authenticator`] gets two hooks: one while the HTTP client is built
//! (mutual TLS installs its identity here) and one before every outgoing
//! request (bearer tokens are attached here).

use crate::error::{FabricError, Result};
use async_trait::async_trait;
use reqwest::{ClientBuilder, Identity, RequestBuilder};
use std::path::Path;
use std::sync::Arc;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Adjust the transport once, while the HTTP client is being built.
    fn configure_client(&self, builder: ClientBuilder) -> Result<ClientBuilder> {
        Ok(builder)
    }

    /// Attach credentials to an outgoing request.
    async fn apply(&self, request: RequestBuilder) -> Result<RequestBuilder>;
}

/// Supplies access tokens for a scope. Acquisition mechanics live outside this crate.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self, scope: &str) -> Result<String>;
}

/// A fixed token, returned for every scope.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self, _scope: &str) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Mutual TLS with a PEM client identity (certificate chain plus private key).
/// PKCS#12 archives are not accepted by the rustls transport; convert them to PEM first.
#[derive(Clone)]
pub struct CertificateAuthenticator {
    pem: Vec<u8>,
}

impl std::fmt::Debug for CertificateAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthenticator").finish_non_exhaustive()
    }
}

impl CertificateAuthenticator {
    pub fn from_pem(pem: impl Into<Vec<u8>>) -> Result<Self> {
        let pem = pem.into();
        Identity::from_pem(&pem)
            .map_err(|e| FabricError::Auth(format!("invalid client certificate: {}", e)))?;
        Ok(Self { pem })
    }

    /// Load a PEM bundle from disk, optionally joined with a separate key file.
    pub fn from_files(cert_path: &Path, key_path: Option<&Path>) -> Result<Self> {
        let mut pem = std::fs::read(cert_path).map_err(|e| {
            FabricError::Auth(format!(
                "read client certificate {}: {}",
                cert_path.display(),
                e
            ))
        })?;
        if let Some(key_path) = key_path {
            let key = std::fs::read(key_path).map_err(|e| {
                FabricError::Auth(format!("read client key {}: {}", key_path.display(), e))
            })?;
            if !pem.ends_with(b"\n") {
                pem.push(b'\n');
            }
            pem.extend_from_slice(&key);
        }
        Self::from_pem(pem)
    }
}

#[async_trait]
impl Authenticator for CertificateAuthenticator {
    fn configure_client(&self, builder: ClientBuilder) -> Result<ClientBuilder> {
        let identity = Identity::from_pem(&self.pem)
            .map_err(|e| FabricError::Auth(format!("invalid client certificate: {}", e)))?;
        Ok(builder.identity(identity))
    }

    async fn apply(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(request)
    }
}

/// `Authorization: Bearer` with a token fetched per request for a fixed scope.
#[derive(Clone)]
pub struct BearerAuthenticator {
    source: Arc<dyn TokenSource>,
    scope: String,
}

impl BearerAuthenticator {
    pub fn new(source: Arc<dyn TokenSource>, scope: impl Into<String>) -> Self {
        Self {
            source,
            scope: scope.into(),
        }
    }

    /// Scope for a cluster registered as an Entra application: `<id>/.default`.
    pub fn for_cluster_application(source: Arc<dyn TokenSource>, application_id: &str) -> Self {
        Self::new(
            source,
            format!("{}/.default", application_id.trim().trim_end_matches('/')),
        )
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

#[async_trait]
impl Authenticator for BearerAuthenticator {
    async fn apply(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.source.token(&self.scope).await?;
        if token.is_empty() {
            return Err(FabricError::Auth(format!(
                "token source returned an empty token for {}",
                self.scope
            )));
        }
        Ok(request.bearer_auth(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_application_scope() {
        let source = Arc::new(StaticTokenSource::new("t"));
        let auth = BearerAuthenticator::for_cluster_application(source, "api://sf-cluster/");
        assert_eq!(auth.scope(), "api://sf-cluster/.default");
    }

    #[tokio::test]
    async fn test_bearer_header_applied() {
        let auth = BearerAuthenticator::new(Arc::new(StaticTokenSource::new("abc")), "scope");
        let request = reqwest::Client::new().get("http://localhost/");
        let request = auth.apply(request).await.unwrap().build().unwrap();
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer abc"
        );
    }

    #[tokio::test]
    async fn test_empty_token_rejected() {
        let auth = BearerAuthenticator::new(Arc::new(StaticTokenSource::new("")), "scope");
        let request = reqwest::Client::new().get("http://localhost/");
        let err = auth.apply(request).await.unwrap_err();
        assert!(matches!(err, FabricError::Auth(_)));
    }

    #[test]
    fn test_invalid_pem_rejected() {
        let err = CertificateAuthenticator::from_pem(b"not a certificate".to_vec()).unwrap_err();
        assert!(matches!(err, FabricError::Auth(_)));
    }

    #[test]
    fn test_missing_certificate_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CertificateAuthenticator::from_files(&dir.path().join("absent.pem"), None)
            .unwrap_err();
        assert!(err.to_string().contains("absent.pem"));
    }
}
