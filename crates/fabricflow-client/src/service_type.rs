//! Service types declared by a provisioned application type version

use crate::client::FabricClient;
use crate::error::{ApiError, Result};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Deserializer};
use tokio_util::sync::CancellationToken;

/// The fields of a service type description this crate reads. The full
/// payload is kept in `raw`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceTypeDescription {
    pub service_type_name: String,
    pub kind: String,
    pub has_persisted_state: bool,
    pub raw: serde_json::Value,
}

impl<'de> Deserialize<'de> for ServiceTypeDescription {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        let text = |key: &str| {
            raw.get(key)
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Ok(ServiceTypeDescription {
            service_type_name: text("ServiceTypeName"),
            kind: text("Kind"),
            has_persisted_state: raw
                .get("HasPersistedState")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            raw,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServiceTypeInfo {
    #[serde(rename = "ServiceTypeDescription", default)]
    pub description: ServiceTypeDescription,
    #[serde(rename = "ServiceManifestName", default)]
    pub service_manifest_name: String,
    #[serde(rename = "ServiceManifestVersion", default)]
    pub service_manifest_version: String,
    #[serde(rename = "IsServiceGroup", default)]
    pub is_service_group: bool,
}

impl ServiceTypeInfo {
    pub fn name(&self) -> &str {
        &self.description.service_type_name
    }
}

impl FabricClient {
    pub async fn list_service_types(
        &self,
        cancel: &CancellationToken,
        application_type_name: &str,
        application_type_version: &str,
    ) -> Result<Vec<ServiceTypeInfo>> {
        let response = self
            .send_empty(
                cancel,
                Method::GET,
                &["ApplicationTypes", application_type_name, "$", "GetServiceTypes"],
                &[("ApplicationTypeVersion", application_type_version)],
            )
            .await?;
        if response.status() == StatusCode::NO_CONTENT {
            self.drain(cancel, response).await?;
            return Ok(Vec::new());
        }
        self.decode(cancel, response, "service types").await
    }

    /// One service type. `204 No Content` is reported as a 404.
    pub async fn get_service_type(
        &self,
        cancel: &CancellationToken,
        application_type_name: &str,
        application_type_version: &str,
        service_type_name: &str,
    ) -> Result<ServiceTypeInfo> {
        let segments = [
            "ApplicationTypes",
            application_type_name,
            "$",
            "GetServiceTypes",
            service_type_name,
        ];
        let response = self
            .send_empty(
                cancel,
                Method::GET,
                &segments,
                &[("ApplicationTypeVersion", application_type_version)],
            )
            .await?;
        if response.status() == StatusCode::NO_CONTENT {
            self.drain(cancel, response).await?;
            let path = format!("/{}", segments.join("/"));
            return Err(ApiError::not_found("GET", &path, "service type not found").into());
        }
        self.decode(cancel, response, "service type response").await
    }
}
