//! REST transport for the Service Fabric cluster management endpoint
//!
//! Builds versioned URLs, attaches credentials, and turns every response with
//! a status of 400 or above into a typed [`ApiError`]. Lifecycle operations are
//! implemented on [`FabricClient`] in the sibling modules.

use crate::auth::Authenticator;
use crate::error::{ApiError, FabricError, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_API_VERSION: &str = "6.0";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const API_VERSION_PARAM: &str = "api-version";
const CONTINUATION_TOKEN_PARAM: &str = "ContinuationToken";

/// Waits used by the polling loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTimings {
    /// Initial delay between long-running-operation polls, until a `Retry-After` overrides it.
    pub operation_poll_delay: Duration,
    /// Interval between upgrade progress checks.
    pub upgrade_poll_interval: Duration,
    /// Backoff before re-reading an application the cluster is still materializing.
    pub materialize_backoff: Duration,
    /// Cap on materialization reads. `None` leaves it bounded only by cancellation.
    pub max_materialize_attempts: Option<u32>,
}

impl Default for PollTimings {
    fn default() -> Self {
        Self {
            operation_poll_delay: Duration::from_secs(5),
            upgrade_poll_interval: Duration::from_secs(5),
            materialize_backoff: Duration::from_secs(2),
            max_materialize_attempts: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub api_version: String,
    pub timeout: Duration,
    pub skip_tls_verify: bool,
    pub timings: PollTimings,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
            skip_tls_verify: false,
            timings: PollTimings::default(),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_timings(mut self, timings: PollTimings) -> Self {
        self.timings = timings;
        self
    }
}

/// Service Fabric REST client.
///
/// Holds only immutable configuration, so clones can be shared freely across
/// concurrent operations.
#[derive(Clone)]
pub struct FabricClient {
    http: reqwest::Client,
    endpoint: Url,
    api_version: String,
    authenticator: Option<Arc<dyn Authenticator>>,
    timings: PollTimings,
}

impl std::fmt::Debug for FabricClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FabricClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_version", &self.api_version)
            .field("authenticated", &self.authenticator.is_some())
            .finish()
    }
}

impl FabricClient {
    pub fn new(
        config: ClientConfig,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> Result<Self> {
        let endpoint = config.endpoint.trim();
        if endpoint.is_empty() {
            return Err(FabricError::InvalidEndpoint("endpoint required".to_string()));
        }
        let endpoint = Url::parse(endpoint)
            .map_err(|e| FabricError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(FabricError::InvalidEndpoint(endpoint.to_string()));
        }

        let api_version = if config.api_version.trim().is_empty() {
            DEFAULT_API_VERSION.to_string()
        } else {
            config.api_version.trim().to_string()
        };

        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if config.skip_tls_verify {
            tracing::warn!(endpoint = %endpoint, "TLS certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(auth) = &authenticator {
            builder = auth.configure_client(builder)?;
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            endpoint,
            api_version,
            authenticator,
            timings: config.timings,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn timings(&self) -> &PollTimings {
        &self.timings
    }

    /// Build `endpoint + segments` with the endpoint query, the extra query, and
    /// `api-version` (unless the caller supplied one).
    pub(crate) fn build_url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| FabricError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(segments);

        let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        pairs.extend(query.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self.finish_query(&mut url, pairs);
        Ok(url)
    }

    /// Resolve a `Location` header against the endpoint.
    ///
    /// Relative locations keep the endpoint's scheme, host and base path, with
    /// both query strings merged. Absolute locations are used as is. Either way
    /// `api-version` is added when missing.
    pub(crate) fn resolve_location(&self, location: &str) -> Result<Url> {
        if let Ok(absolute) = Url::parse(location) {
            let mut url = absolute;
            if !url.query_pairs().any(|(k, _)| k == API_VERSION_PARAM) {
                let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
                self.finish_query(&mut url, pairs);
            }
            return Ok(url);
        }

        let (path, query) = match location.split_once('?') {
            Some((path, query)) => (path, query),
            None => (location, ""),
        };

        let mut url = self.endpoint.clone();
        let relative: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if !relative.is_empty() {
            // Segments from the location are already escaped by the cluster.
            let base = url.path().trim_end_matches('/').to_string();
            url.set_path(&format!("{}/{}", base, relative.join("/")));
        }

        let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        url.set_query((!query.is_empty()).then_some(query));
        pairs.extend(url.query_pairs().into_owned());
        self.finish_query(&mut url, pairs);
        Ok(url)
    }

    fn finish_query(&self, url: &mut Url, mut pairs: Vec<(String, String)>) {
        if !pairs.iter().any(|(k, _)| k == API_VERSION_PARAM) {
            pairs.push((API_VERSION_PARAM.to_string(), self.api_version.clone()));
        }
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    pub(crate) async fn send_json<B: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<Response> {
        let body = serde_json::to_vec(body)
            .map_err(|e| FabricError::Validation(format!("encode request body: {}", e)))?;
        self.execute(cancel, method, segments, query, Some(body)).await
    }

    pub(crate) async fn send_empty(
        &self,
        cancel: &CancellationToken,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Response> {
        self.execute(cancel, method, segments, query, None).await
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<Vec<u8>>,
    ) -> Result<Response> {
        let url = self.build_url(segments, query)?;
        let path = format!("/{}", segments.join("/"));
        tracing::debug!(method = %method, path = %path, "sending request");

        let mut request = self.http.request(method.clone(), url);
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body);
        }

        let response = self.dispatch(cancel, request).await?;
        let status = response.status();
        tracing::debug!(method = %method, path = %path, status = status.as_u16(), "received response");

        if status.as_u16() >= 400 {
            let body = self.read_body(cancel, response).await?;
            let body = String::from_utf8_lossy(&body);
            return Err(ApiError::from_response(method.as_str(), &path, status.as_u16(), &body).into());
        }
        Ok(response)
    }

    /// Attach `Accept` and credentials, then send, racing the cancellation token.
    pub(crate) async fn dispatch(
        &self,
        cancel: &CancellationToken,
        request: RequestBuilder,
    ) -> Result<Response> {
        let mut request = request.header(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(auth) = &self.authenticator {
            request = auth.apply(request).await?;
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(FabricError::Cancelled),
            response = request.send() => Ok(response?),
        }
    }

    pub(crate) fn get_url(&self, url: Url) -> RequestBuilder {
        self.http.get(url)
    }

    pub(crate) async fn read_body(
        &self,
        cancel: &CancellationToken,
        response: Response,
    ) -> Result<Vec<u8>> {
        tokio::select! {
            _ = cancel.cancelled() => Err(FabricError::Cancelled),
            body = response.bytes() => Ok(body?.to_vec()),
        }
    }

    /// Read and discard a body the caller has no use for.
    pub(crate) async fn drain(&self, cancel: &CancellationToken, response: Response) -> Result<()> {
        self.read_body(cancel, response).await.map(|_| ())
    }

    pub(crate) async fn decode<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        response: Response,
        context: &str,
    ) -> Result<T> {
        let body = self.read_body(cancel, response).await?;
        serde_json::from_slice(&body).map_err(|e| FabricError::decode(context, e, &body))
    }

    /// GET a paged list, following `ContinuationToken` until it is exhausted.
    pub(crate) async fn get_paged<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        segments: &[&str],
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut page_query: Vec<(&str, &str)> = query.to_vec();
            if let Some(token) = continuation.as_deref() {
                page_query.push((CONTINUATION_TOKEN_PARAM, token));
            }
            let response = self
                .send_empty(cancel, Method::GET, segments, &page_query)
                .await?;
            let page: PagedList<T> = self.decode(cancel, response, context).await?;
            items.extend(page.items);
            match page.continuation_token {
                Some(token) if !token.is_empty() => continuation = Some(token),
                _ => return Ok(items),
            }
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct PagedList<T> {
    #[serde(rename = "ContinuationToken", default)]
    continuation_token: Option<String>,
    #[serde(rename = "Items", default = "Vec::new")]
    items: Vec<T>,
}
