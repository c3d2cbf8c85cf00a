//! Application lifecycle: create, delete, read and list
//!
//! Upgrades live in [`crate::upgrade`].

use crate::client::FabricClient;
use crate::error::{ApiError, FabricError, Result};
use crate::naming::application_id;
use crate::parameters::{NameValueParameter, parameter_list_to_map, to_parameter_list};
use crate::poller::location_of;
use regex::Regex;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use tokio_util::sync::CancellationToken;

static GUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("GUID pattern is a valid regex")
});

pub fn is_guid(value: &str) -> bool {
    GUID.is_match(value)
}

/// Desired state submitted to `Applications/$/Create`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationDescription {
    pub name: String,
    pub type_name: String,
    pub type_version: String,
    pub parameters: HashMap<String, String>,
    pub capacity: Option<ApplicationCapacityDescription>,
    pub managed_identity: Option<ManagedApplicationIdentityDescription>,
}

#[derive(Debug, Serialize)]
struct CreateApplicationRequest<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "TypeName")]
    type_name: &'a str,
    #[serde(rename = "TypeVersion")]
    type_version: &'a str,
    #[serde(rename = "ParameterList", skip_serializing_if = "Vec::is_empty")]
    parameter_list: Vec<NameValueParameter>,
    #[serde(rename = "ApplicationCapacity", skip_serializing_if = "Option::is_none")]
    capacity: Option<&'a ApplicationCapacityDescription>,
    #[serde(
        rename = "ManagedApplicationIdentity",
        skip_serializing_if = "Option::is_none"
    )]
    managed_identity: Option<&'a ManagedApplicationIdentityDescription>,
}

impl<'a> From<&'a ApplicationDescription> for CreateApplicationRequest<'a> {
    fn from(app: &'a ApplicationDescription) -> Self {
        Self {
            name: &app.name,
            type_name: &app.type_name,
            type_version: &app.type_version,
            parameter_list: to_parameter_list(&app.parameters),
            capacity: app.capacity.as_ref(),
            managed_identity: app.managed_identity.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationCapacityDescription {
    #[serde(rename = "MinimumNodes", default, skip_serializing_if = "Option::is_none")]
    pub minimum_nodes: Option<i64>,
    #[serde(rename = "MaximumNodes", default, skip_serializing_if = "Option::is_none")]
    pub maximum_nodes: Option<i64>,
    #[serde(
        rename = "ApplicationMetrics",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub application_metrics: Vec<ApplicationMetricDescription>,
}

impl ApplicationCapacityDescription {
    /// Same node counts and the same metrics, in any order.
    pub fn equivalent(&self, other: &Self) -> bool {
        if self.minimum_nodes != other.minimum_nodes
            || self.maximum_nodes != other.maximum_nodes
            || self.application_metrics.len() != other.application_metrics.len()
        {
            return false;
        }
        let by_name: HashMap<&str, &ApplicationMetricDescription> = self
            .application_metrics
            .iter()
            .map(|m| (m.name.as_str(), m))
            .collect();
        other
            .application_metrics
            .iter()
            .all(|m| by_name.get(m.name.as_str()).is_some_and(|mine| *mine == m))
    }
}

/// Per-metric capacity: per-node maximum, per-node reservation, cluster-wide total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationMetricDescription {
    #[serde(rename = "Name", default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "MaximumCapacity", default, skip_serializing_if = "Option::is_none")]
    pub maximum_capacity: Option<i64>,
    #[serde(
        rename = "ReservationCapacity",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reservation_capacity: Option<i64>,
    #[serde(
        rename = "TotalApplicationCapacity",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub total_application_capacity: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedApplicationIdentityDescription {
    #[serde(
        rename = "TokenServiceEndpoint",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub token_service_endpoint: String,
    #[serde(rename = "ManagedIdentities", default, skip_serializing_if = "Vec::is_empty")]
    pub managed_identities: Vec<IdentityReference>,
}

impl ManagedApplicationIdentityDescription {
    /// Build from raw identity strings, skipping blanks.
    pub fn from_references<I, S>(token_service_endpoint: impl Into<String>, refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            token_service_endpoint: token_service_endpoint.into(),
            managed_identities: refs
                .into_iter()
                .filter_map(|r| IdentityReference::parse(r.as_ref()))
                .collect(),
        }
    }

    /// Same endpoint and the same identities, in any order.
    pub fn equivalent(&self, other: &Self) -> bool {
        if self.token_service_endpoint != other.token_service_endpoint
            || self.managed_identities.len() != other.managed_identities.len()
        {
            return false;
        }
        let mut used = vec![false; other.managed_identities.len()];
        self.managed_identities.iter().all(|mine| {
            let found = other
                .managed_identities
                .iter()
                .enumerate()
                .find(|(j, theirs)| !used[*j] && mine.matches(theirs))
                .map(|(j, _)| j);
            match found {
                Some(j) => {
                    used[j] = true;
                    true
                }
                None => false,
            }
        })
    }
}

/// A managed identity, by friendly name or by principal id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IdentityReferenceWire", into = "IdentityReferenceWire")]
pub enum IdentityReference {
    Name(String),
    PrincipalId(String),
}

impl IdentityReference {
    /// GUID-shaped values become principal ids; blank input is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let candidate = raw.trim();
        if candidate.is_empty() {
            None
        } else if is_guid(candidate) {
            Some(IdentityReference::PrincipalId(candidate.to_string()))
        } else {
            Some(IdentityReference::Name(candidate.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            IdentityReference::Name(v) | IdentityReference::PrincipalId(v) => v,
        }
    }

    /// Principal ids compare case-insensitively, names exactly.
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (IdentityReference::PrincipalId(a), IdentityReference::PrincipalId(b)) => {
                a.eq_ignore_ascii_case(b)
            }
            (IdentityReference::Name(a), IdentityReference::Name(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IdentityReferenceWire {
    #[serde(rename = "Name", default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(rename = "PrincipalId", default, skip_serializing_if = "String::is_empty")]
    principal_id: String,
}

impl From<IdentityReferenceWire> for IdentityReference {
    fn from(wire: IdentityReferenceWire) -> Self {
        if wire.name.is_empty() {
            IdentityReference::PrincipalId(wire.principal_id)
        } else {
            IdentityReference::Name(wire.name)
        }
    }
}

impl From<IdentityReference> for IdentityReferenceWire {
    fn from(reference: IdentityReference) -> Self {
        match reference {
            IdentityReference::Name(name) => Self {
                name,
                ..Default::default()
            },
            IdentityReference::PrincipalId(principal_id) => Self {
                principal_id,
                ..Default::default()
            },
        }
    }
}

/// An application instance as reported by the cluster.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApplicationInfo {
    #[serde(rename = "Id", default)]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "TypeName", default)]
    pub type_name: String,
    #[serde(rename = "TypeVersion", default)]
    pub type_version: String,
    #[serde(rename = "Parameters", default)]
    pub parameters: Vec<NameValueParameter>,
    #[serde(rename = "ParameterList", default)]
    pub parameter_list: Vec<NameValueParameter>,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "HealthState", default)]
    pub health_state: String,
    #[serde(rename = "ManagedApplicationIdentity", default)]
    pub managed_identity: Option<ManagedApplicationIdentityDescription>,
    #[serde(rename = "ApplicationCapacity", default)]
    pub capacity: Option<ApplicationCapacityDescription>,
}

impl ApplicationInfo {
    /// Clusters report parameters under either `Parameters` or `ParameterList`.
    pub fn parameter_entries(&self) -> &[NameValueParameter] {
        if self.parameters.is_empty() {
            &self.parameter_list
        } else {
            &self.parameters
        }
    }

    pub fn parameter_map(&self) -> HashMap<String, String> {
        parameter_list_to_map(self.parameter_entries())
    }
}

impl FabricClient {
    pub async fn create_application(
        &self,
        cancel: &CancellationToken,
        app: &ApplicationDescription,
    ) -> Result<()> {
        if app.name.trim().is_empty() {
            return Err(FabricError::Validation("application name required".to_string()));
        }
        let body = CreateApplicationRequest::from(app);
        let response = self
            .send_json(cancel, Method::POST, &["Applications", "$", "Create"], &[], &body)
            .await?;
        self.complete(cancel, response).await?;
        tracing::info!(
            name = %app.name,
            type_name = %app.type_name,
            type_version = %app.type_version,
            "created application"
        );
        Ok(())
    }

    pub async fn delete_application(
        &self,
        cancel: &CancellationToken,
        name: &str,
        force: bool,
    ) -> Result<()> {
        let id = application_id(name);
        let query: &[(&str, &str)] = if force { &[("ForceRemove", "true")] } else { &[] };
        let response = self
            .send_empty(cancel, Method::POST, &["Applications", &id, "$", "Delete"], query)
            .await?;
        self.complete(cancel, response).await?;
        tracing::info!(name, force, "deleted application");
        Ok(())
    }

    /// Read an application.
    ///
    /// `202 Accepted` means the cluster is still materializing it: the returned
    /// location is polled, then the read is retried after a backoff. `204 No
    /// Content` is reported as a 404.
    pub async fn get_application(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<ApplicationInfo> {
        let id = application_id(name);
        let segments = ["Applications", id.as_str()];
        let path = format!("/Applications/{}", id);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let response = self
                .send_empty(cancel, Method::GET, &segments, &[])
                .await?;

            match response.status() {
                StatusCode::ACCEPTED => {
                    let location = location_of(&response).unwrap_or_default();
                    self.drain(cancel, response).await?;
                    self.poll_operation(cancel, &location).await?;

                    if let Some(max) = self.timings().max_materialize_attempts
                        && attempts >= max
                    {
                        return Err(FabricError::OperationFailed(format!(
                            "application {} still materializing after {} attempts",
                            name, attempts
                        )));
                    }
                    tracing::debug!(name, attempts, "application still materializing");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(FabricError::Cancelled),
                        _ = tokio::time::sleep(self.timings().materialize_backoff) => {}
                    }
                }
                StatusCode::NO_CONTENT => {
                    self.drain(cancel, response).await?;
                    return Err(
                        ApiError::not_found("GET", &path, "application not found").into(),
                    );
                }
                _ => {
                    let body = self.read_body(cancel, response).await?;
                    if body.is_empty() {
                        return Err(FabricError::EmptyResponse(name.to_string()));
                    }
                    return serde_json::from_slice(&body)
                        .map_err(|e| FabricError::decode("application response", e, &body));
                }
            }
        }
    }

    /// All applications, optionally only those of one application type.
    pub async fn list_applications(
        &self,
        cancel: &CancellationToken,
        type_name: &str,
    ) -> Result<Vec<ApplicationInfo>> {
        let query: Vec<(&str, &str)> = if type_name.is_empty() {
            Vec::new()
        } else {
            vec![("ApplicationTypeName", type_name)]
        };
        self.get_paged(
            cancel,
            &["Applications", "$", "GetApplications"],
            &query,
            "applications",
        )
        .await
    }
}
