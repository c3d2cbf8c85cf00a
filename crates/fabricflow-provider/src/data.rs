//! Read-only lookups

use crate::error::{ProviderError, Result};
use fabricflow_client::{
    ApplicationInfo, ApplicationTypeInfo, FabricClient, ServiceInfo, ServiceTypeInfo,
};
use tokio_util::sync::CancellationToken;

fn given(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
pub struct DataSources {
    client: FabricClient,
}

impl DataSources {
    pub fn new(client: FabricClient) -> Self {
        Self { client }
    }

    /// All application types, the versions of one type, or one version.
    pub async fn application_types(
        &self,
        cancel: &CancellationToken,
        name: Option<&str>,
        version: Option<&str>,
    ) -> Result<Vec<ApplicationTypeInfo>> {
        let items = match (given(name), given(version)) {
            (None, Some(_)) => {
                return Err(ProviderError::InvalidConfig(
                    "version: requires name to be specified".to_string(),
                ));
            }
            (Some(name), Some(version)) => {
                match self
                    .client
                    .get_application_type_version(cancel, name, version)
                    .await
                {
                    Ok(info) => vec![info],
                    Err(fabricflow_client::FabricError::ApplicationTypeVersionNotFound { .. }) => {
                        Vec::new()
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            (name, None) => {
                self.client
                    .list_application_type_versions(cancel, name.unwrap_or_default())
                    .await?
            }
        };

        if items.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "no application types matched name {:?} and version {:?}",
                name.unwrap_or_default(),
                version.unwrap_or_default()
            )));
        }
        Ok(items)
    }

    pub async fn application(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<ApplicationInfo> {
        let name = given(Some(name))
            .ok_or_else(|| ProviderError::InvalidConfig("name: must be set".to_string()))?;
        Ok(self.client.get_application(cancel, name).await?)
    }

    /// One service by name, or every service of the application optionally
    /// filtered by service type.
    pub async fn services(
        &self,
        cancel: &CancellationToken,
        application_name: &str,
        service_name: Option<&str>,
        service_type_name: Option<&str>,
    ) -> Result<Vec<ServiceInfo>> {
        let application_name = given(Some(application_name)).ok_or_else(|| {
            ProviderError::InvalidConfig("application_name: must be set".to_string())
        })?;

        let items = match given(service_name) {
            Some(service) => vec![
                self.client
                    .get_service(cancel, application_name, service)
                    .await?,
            ],
            None => {
                self.client
                    .list_services(
                        cancel,
                        application_name,
                        given(service_type_name).unwrap_or_default(),
                    )
                    .await?
            }
        };

        if items.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "no services matched application {:?}",
                application_name
            )));
        }
        Ok(items)
    }

    pub async fn service_types(
        &self,
        cancel: &CancellationToken,
        application_type_name: &str,
        application_type_version: &str,
        service_type_name: Option<&str>,
    ) -> Result<Vec<ServiceTypeInfo>> {
        let type_name = given(Some(application_type_name)).ok_or_else(|| {
            ProviderError::InvalidConfig("application_type_name: must be set".to_string())
        })?;
        let type_version = given(Some(application_type_version)).ok_or_else(|| {
            ProviderError::InvalidConfig("application_type_version: must be set".to_string())
        })?;

        let items = match given(service_type_name) {
            Some(service_type) => vec![
                self.client
                    .get_service_type(cancel, type_name, type_version, service_type)
                    .await?,
            ],
            None => {
                self.client
                    .list_service_types(cancel, type_name, type_version)
                    .await?
            }
        };

        if items.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "no service types matched application type {:?} version {:?}",
                type_name, type_version
            )));
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabricflow_client::ClientConfig;

    fn data() -> DataSources {
        let client = FabricClient::new(ClientConfig::new("http://127.0.0.1:19080"), None).unwrap();
        DataSources::new(client)
    }

    #[tokio::test]
    async fn test_version_requires_name() {
        let err = data()
            .application_types(&CancellationToken::new(), None, Some("1.0.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_services_require_application() {
        let err = data()
            .services(&CancellationToken::new(), "  ", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_service_types_require_version() {
        let err = data()
            .service_types(&CancellationToken::new(), "ShopType", "", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidConfig(_)));
    }
}
