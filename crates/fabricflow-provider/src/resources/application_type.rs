//! Application type resource

use super::{DeleteOutcome, Resource};
use crate::action::Action;
use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use fabricflow_client::{FabricClient, FabricError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

const RESOURCE_TYPE: &str = "application_type";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationTypeConfig {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub package_uri: String,
    /// Keep the version registered when the resource is deleted. Defaults to false.
    #[serde(default)]
    pub retain_versions: Option<bool>,
}

impl ApplicationTypeConfig {
    fn retain_versions(&self) -> bool {
        self.retain_versions.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationTypeState {
    pub id: String,
    pub name: String,
    pub version: String,
    pub package_uri: String,
    pub status: String,
    pub retain_versions: Option<bool>,
}

impl ApplicationTypeState {
    /// Imported state has no recorded choice and is kept.
    fn retains(&self) -> bool {
        self.retain_versions.unwrap_or(true)
    }
}

fn type_id(name: &str, version: &str) -> String {
    format!("{}/{}", name, version)
}

fn is_absent(err: &FabricError) -> bool {
    err.is_not_found() || matches!(err, FabricError::ApplicationTypeVersionNotFound { .. })
}

#[derive(Debug, Clone)]
pub struct ApplicationTypeResource {
    client: FabricClient,
}

impl ApplicationTypeResource {
    pub fn new(client: FabricClient) -> Self {
        Self { client }
    }

    async fn provision_and_read(
        &self,
        cancel: &CancellationToken,
        config: &ApplicationTypeConfig,
    ) -> Result<ApplicationTypeState> {
        self.client
            .provision_application_type(cancel, &config.name, &config.version, &config.package_uri)
            .await?;
        tracing::info!(name = %config.name, version = %config.version, "provisioned application type");

        let seed = ApplicationTypeState {
            id: type_id(&config.name, &config.version),
            name: config.name.clone(),
            version: config.version.clone(),
            package_uri: config.package_uri.clone(),
            status: String::new(),
            retain_versions: Some(config.retain_versions()),
        };
        self.read(cancel, &seed).await?.ok_or_else(|| {
            ProviderError::NotFound(format!(
                "application type {} not registered after provisioning",
                seed.id
            ))
        })
    }
}

#[async_trait]
impl Resource for ApplicationTypeResource {
    type Config = ApplicationTypeConfig;
    type State = ApplicationTypeState;

    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(
        &self,
        cancel: &CancellationToken,
        config: &ApplicationTypeConfig,
    ) -> Result<ApplicationTypeState> {
        self.provision_and_read(cancel, config).await
    }

    async fn read(
        &self,
        cancel: &CancellationToken,
        state: &ApplicationTypeState,
    ) -> Result<Option<ApplicationTypeState>> {
        match self
            .client
            .get_application_type_version(cancel, &state.name, &state.version)
            .await
        {
            Ok(info) => Ok(Some(ApplicationTypeState {
                id: type_id(&state.name, &state.version),
                status: info.status,
                ..state.clone()
            })),
            Err(e) if is_absent(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn plan(&self, prior: &ApplicationTypeConfig, desired: &ApplicationTypeConfig) -> Result<Action> {
        let mut action = Action::no_op(RESOURCE_TYPE, type_id(&prior.name, &prior.version));
        if prior.name != desired.name {
            action.record("name", true);
        }
        if prior.version != desired.version {
            action.record("version", true);
        }
        if prior.package_uri != desired.package_uri {
            action.record("package_uri", false);
        }
        Ok(action)
    }

    async fn update(
        &self,
        cancel: &CancellationToken,
        prior: &ApplicationTypeConfig,
        desired: &ApplicationTypeConfig,
    ) -> Result<ApplicationTypeState> {
        if prior.name != desired.name {
            return Err(ProviderError::replacement(
                "name",
                "an application type cannot be renamed",
            ));
        }
        if prior.version != desired.version {
            return Err(ProviderError::replacement(
                "version",
                "a new version is provisioned as a new resource",
            ));
        }

        if prior.package_uri == desired.package_uri {
            let seed = ApplicationTypeState {
                id: type_id(&desired.name, &desired.version),
                name: desired.name.clone(),
                version: desired.version.clone(),
                package_uri: desired.package_uri.clone(),
                status: String::new(),
                retain_versions: Some(desired.retain_versions()),
            };
            return self.read(cancel, &seed).await?.ok_or_else(|| {
                ProviderError::NotFound(format!("application type {}", seed.id))
            });
        }
        self.provision_and_read(cancel, desired).await
    }

    async fn delete(
        &self,
        cancel: &CancellationToken,
        state: &ApplicationTypeState,
    ) -> Result<DeleteOutcome> {
        if state.retains() {
            tracing::info!(
                name = %state.name,
                version = %state.version,
                "retaining application type version"
            );
            return Ok(DeleteOutcome::Retained);
        }

        match self
            .client
            .unprovision_application_type(cancel, &state.name, &state.version, false)
            .await
        {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if is_absent(&e) => Ok(DeleteOutcome::AlreadyGone),
            Err(e) if e.is_application_type_in_use() => {
                tracing::warn!(
                    name = %state.name,
                    version = %state.version,
                    "application type still in use, skipped unprovisioning"
                );
                Ok(DeleteOutcome::InUse)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Import identifiers have the form `name/version`.
    fn import(&self, id: &str) -> Result<ApplicationTypeState> {
        match id.split_once('/') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => {
                Ok(ApplicationTypeState {
                    id: id.to_string(),
                    name: name.to_string(),
                    version: version.to_string(),
                    ..Default::default()
                })
            }
            _ => Err(ProviderError::InvalidConfig(format!(
                "import id {:?}: expected name/version",
                id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;
    use fabricflow_client::ClientConfig;

    fn resource() -> ApplicationTypeResource {
        let client = FabricClient::new(ClientConfig::new("http://127.0.0.1:19080"), None).unwrap();
        ApplicationTypeResource::new(client)
    }

    fn config(version: &str, uri: &str) -> ApplicationTypeConfig {
        ApplicationTypeConfig {
            name: "ShopType".into(),
            version: version.into(),
            package_uri: uri.into(),
            retain_versions: None,
        }
    }

    #[test]
    fn test_plan() {
        let r = resource();
        let base = config("1.0.0", "https://store/a.sfpkg");
        assert_eq!(r.plan(&base, &base).unwrap().action_type, ActionType::NoOp);
        assert_eq!(
            r.plan(&base, &config("1.0.0", "https://store/b.sfpkg")).unwrap().action_type,
            ActionType::Update
        );
        assert_eq!(
            r.plan(&base, &config("2.0.0", "https://store/a.sfpkg")).unwrap().action_type,
            ActionType::Replace
        );
    }

    #[test]
    fn test_import() {
        let r = resource();
        let state = r.import("ShopType/1.0.0").unwrap();
        assert_eq!(state.name, "ShopType");
        assert_eq!(state.version, "1.0.0");
        assert!(r.import("ShopType").is_err());
        assert!(r.import("/1.0.0").is_err());
    }

    #[tokio::test]
    async fn test_imported_state_is_retained() {
        let state = resource().import("ShopType/1.0.0").unwrap();
        let outcome = resource()
            .delete(&CancellationToken::new(), &state)
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::Retained);
    }

    #[tokio::test]
    async fn test_version_change_requires_replacement() {
        let err = resource()
            .update(
                &CancellationToken::new(),
                &config("1.0.0", ""),
                &config("2.0.0", ""),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RequiresReplacement { ref attribute, .. } if attribute == "version"));
    }
}
