//! Application type provisioning

use crate::client::FabricClient;
use crate::error::{FabricError, Result};
use crate::parameters::NameValueParameter;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

const PROVISION_KIND_EXTERNAL_STORE: &str = "ExternalStore";

#[derive(Debug, Serialize)]
struct ProvisionApplicationTypeRequest<'a> {
    #[serde(rename = "Kind")]
    kind: &'a str,
    #[serde(rename = "Async")]
    r#async: bool,
    #[serde(rename = "ApplicationTypeName")]
    application_type_name: &'a str,
    #[serde(rename = "ApplicationTypeVersion")]
    application_type_version: &'a str,
    #[serde(
        rename = "ApplicationPackageDownloadUri",
        skip_serializing_if = "is_blank"
    )]
    application_package_download_uri: &'a str,
}

fn is_blank(value: &&str) -> bool {
    value.is_empty()
}

#[derive(Debug, Serialize)]
struct UnprovisionApplicationTypeRequest<'a> {
    #[serde(rename = "Async")]
    r#async: bool,
    #[serde(rename = "ApplicationTypeVersion")]
    application_type_version: &'a str,
    #[serde(rename = "ForceRemove", skip_serializing_if = "std::ops::Not::not")]
    force_remove: bool,
}

/// A registered application type version.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApplicationTypeInfo {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Version", default)]
    pub version: String,
    #[serde(rename = "ApplicationTypeName", default)]
    pub application_type_name: String,
    #[serde(rename = "ApplicationTypeVersion", default)]
    pub application_type_version: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "DefaultParameterList", default)]
    pub default_parameter_list: Vec<NameValueParameter>,
}

impl ApplicationTypeInfo {
    pub fn type_name(&self) -> &str {
        if self.application_type_name.is_empty() {
            &self.name
        } else {
            &self.application_type_name
        }
    }

    pub fn type_version(&self) -> &str {
        if self.application_type_version.is_empty() {
            &self.version
        } else {
            &self.application_type_version
        }
    }
}

impl FabricClient {
    /// Register an application type version from an external package and wait
    /// for provisioning to finish.
    pub async fn provision_application_type(
        &self,
        cancel: &CancellationToken,
        name: &str,
        version: &str,
        package_uri: &str,
    ) -> Result<()> {
        let body = ProvisionApplicationTypeRequest {
            kind: PROVISION_KIND_EXTERNAL_STORE,
            r#async: true,
            application_type_name: name,
            application_type_version: version,
            application_package_download_uri: package_uri,
        };
        let response = self
            .send_json(
                cancel,
                Method::POST,
                &["ApplicationTypes", "$", "Provision"],
                &[],
                &body,
            )
            .await?;
        self.complete(cancel, response).await?;
        tracing::info!(name, version, "provisioned application type");
        Ok(())
    }

    /// Remove an application type version and wait for it to be unregistered.
    pub async fn unprovision_application_type(
        &self,
        cancel: &CancellationToken,
        name: &str,
        version: &str,
        force: bool,
    ) -> Result<()> {
        let body = UnprovisionApplicationTypeRequest {
            r#async: true,
            application_type_version: version,
            force_remove: force,
        };
        let response = self
            .send_json(
                cancel,
                Method::POST,
                &["ApplicationTypes", name, "$", "Unprovision"],
                &[],
                &body,
            )
            .await?;
        self.complete(cancel, response).await?;
        tracing::info!(name, version, force, "unprovisioned application type");
        Ok(())
    }

    /// All registered versions, filtered client-side by case-insensitive name
    /// when `name` is non-empty.
    pub async fn list_application_type_versions(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<Vec<ApplicationTypeInfo>> {
        let items: Vec<ApplicationTypeInfo> = self
            .get_paged(
                cancel,
                &["ApplicationTypes"],
                &[("ExcludeApplicationParameters", "false")],
                "application types",
            )
            .await?;
        if name.is_empty() {
            return Ok(items);
        }
        Ok(items
            .into_iter()
            .filter(|item| item.type_name().eq_ignore_ascii_case(name))
            .collect())
    }

    /// A specific version. A miss is [`FabricError::ApplicationTypeVersionNotFound`],
    /// not a typed 404.
    pub async fn get_application_type_version(
        &self,
        cancel: &CancellationToken,
        name: &str,
        version: &str,
    ) -> Result<ApplicationTypeInfo> {
        self.list_application_type_versions(cancel, name)
            .await?
            .into_iter()
            .find(|item| {
                item.type_name().eq_ignore_ascii_case(name)
                    && item.type_version().eq_ignore_ascii_case(version)
            })
            .ok_or_else(|| FabricError::ApplicationTypeVersionNotFound {
                name: name.to_string(),
                version: version.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_body() {
        let body = ProvisionApplicationTypeRequest {
            kind: PROVISION_KIND_EXTERNAL_STORE,
            r#async: true,
            application_type_name: "Contoso.App",
            application_type_version: "1.0.0",
            application_package_download_uri: "",
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"Kind":"ExternalStore","Async":true,"ApplicationTypeName":"Contoso.App","ApplicationTypeVersion":"1.0.0"}"#
        );
    }

    #[test]
    fn test_unprovision_omits_false_force() {
        let body = UnprovisionApplicationTypeRequest {
            r#async: true,
            application_type_version: "1.0.0",
            force_remove: false,
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"Async":true,"ApplicationTypeVersion":"1.0.0"}"#
        );
    }

    #[test]
    fn test_type_name_fallbacks() {
        let legacy: ApplicationTypeInfo =
            serde_json::from_str(r#"{"Name":"Contoso.App","Version":"2.0.0","Status":"Available"}"#)
                .unwrap();
        assert_eq!(legacy.type_name(), "Contoso.App");
        assert_eq!(legacy.type_version(), "2.0.0");

        let current: ApplicationTypeInfo = serde_json::from_str(
            r#"{"Name":"ignored","ApplicationTypeName":"Contoso.App","ApplicationTypeVersion":"3.0.0"}"#,
        )
        .unwrap();
        assert_eq!(current.type_name(), "Contoso.App");
        assert_eq!(current.type_version(), "3.0.0");
        assert!(current.default_parameter_list.is_empty());
    }
}
