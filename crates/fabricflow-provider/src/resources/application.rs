//! Application resource
//!
//! Version and parameter changes become rolling upgrades. Type name, capacity,
//! and managed identity cannot change in place.

use super::{DeleteOutcome, Resource};
use crate::action::Action;
use crate::config::ProviderFeatures;
use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use fabricflow_client::{
    ApplicationCapacityDescription, ApplicationDescription, ApplicationHealthPolicy,
    ApplicationInfo, ApplicationMetricDescription, ApplicationUpgradeDescription, FabricClient,
    ManagedApplicationIdentityDescription, RollingUpgradeMode, RollingUpgradeMonitoringPolicy,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

const RESOURCE_TYPE: &str = "application";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub name: String,
    pub type_name: String,
    pub type_version: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    #[serde(default)]
    pub application_capacity: Option<CapacityConfig>,
    #[serde(default)]
    pub managed_application_identity: Option<IdentityConfig>,
    #[serde(default)]
    pub upgrade_policy: Option<UpgradePolicyConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityConfig {
    #[serde(default)]
    pub minimum_nodes: Option<i64>,
    #[serde(default)]
    pub maximum_nodes: Option<i64>,
    #[serde(default)]
    pub application_metrics: Vec<MetricConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricConfig {
    pub name: String,
    #[serde(default)]
    pub maximum_capacity: Option<i64>,
    #[serde(default)]
    pub reservation_capacity: Option<i64>,
    #[serde(default)]
    pub total_application_capacity: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub token_service_endpoint: String,
    /// Identity names or principal ids (UUIDs).
    #[serde(default)]
    pub identities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradePolicyConfig {
    #[serde(default)]
    pub force_restart: Option<bool>,
    #[serde(default)]
    pub upgrade_mode: Option<String>,
    #[serde(default)]
    pub monitoring_policy: Option<MonitoringPolicyConfig>,
    #[serde(default)]
    pub application_health_policy: Option<HealthPolicyConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringPolicyConfig {
    #[serde(default)]
    pub failure_action: Option<String>,
    #[serde(default)]
    pub health_check_wait_duration: Option<String>,
    #[serde(default)]
    pub health_check_stable_duration: Option<String>,
    #[serde(default)]
    pub health_check_retry_timeout: Option<String>,
    #[serde(default)]
    pub upgrade_timeout: Option<String>,
    #[serde(default)]
    pub upgrade_domain_timeout: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPolicyConfig {
    #[serde(default)]
    pub consider_warning_as_error: Option<bool>,
    #[serde(default)]
    pub max_percent_unhealthy_deployed_applications: Option<i64>,
}

impl CapacityConfig {
    fn to_description(&self) -> ApplicationCapacityDescription {
        ApplicationCapacityDescription {
            minimum_nodes: self.minimum_nodes,
            maximum_nodes: self.maximum_nodes,
            application_metrics: self
                .application_metrics
                .iter()
                .map(|m| ApplicationMetricDescription {
                    name: m.name.clone(),
                    maximum_capacity: m.maximum_capacity,
                    reservation_capacity: m.reservation_capacity,
                    total_application_capacity: m.total_application_capacity,
                })
                .collect(),
        }
    }
}

impl IdentityConfig {
    fn to_description(&self) -> ManagedApplicationIdentityDescription {
        ManagedApplicationIdentityDescription::from_references(
            self.token_service_endpoint.trim(),
            &self.identities,
        )
    }
}

impl MonitoringPolicyConfig {
    fn to_policy(&self) -> Option<RollingUpgradeMonitoringPolicy> {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        let policy = RollingUpgradeMonitoringPolicy {
            failure_action: text(&self.failure_action),
            health_check_wait_duration: text(&self.health_check_wait_duration),
            health_check_stable_duration: text(&self.health_check_stable_duration),
            health_check_retry_timeout: text(&self.health_check_retry_timeout),
            upgrade_timeout: text(&self.upgrade_timeout),
            upgrade_domain_timeout: text(&self.upgrade_domain_timeout),
        };
        (policy != RollingUpgradeMonitoringPolicy::default()).then_some(policy)
    }
}

impl HealthPolicyConfig {
    fn to_policy(&self) -> Option<ApplicationHealthPolicy> {
        if self.consider_warning_as_error.is_none()
            && self.max_percent_unhealthy_deployed_applications.is_none()
        {
            return None;
        }
        Some(ApplicationHealthPolicy {
            consider_warning_as_error: self.consider_warning_as_error.unwrap_or(false),
            max_percent_unhealthy_deployed_applications: self
                .max_percent_unhealthy_deployed_applications,
        })
    }
}

impl ApplicationConfig {
    fn capacity(&self) -> Option<ApplicationCapacityDescription> {
        self.application_capacity.as_ref().map(CapacityConfig::to_description)
    }

    fn managed_identity(&self) -> Option<ManagedApplicationIdentityDescription> {
        self.managed_application_identity
            .as_ref()
            .map(IdentityConfig::to_description)
    }

    pub fn to_description(&self) -> ApplicationDescription {
        ApplicationDescription {
            name: self.name.clone(),
            type_name: self.type_name.clone(),
            type_version: self.type_version.clone(),
            parameters: self.parameters.clone(),
            capacity: self.capacity(),
            managed_identity: self.managed_identity(),
        }
    }

    /// Upgrade towards this configuration. `default_force_restart` applies
    /// unless the policy sets `force_restart` explicitly.
    pub fn to_upgrade(&self, default_force_restart: bool) -> Result<ApplicationUpgradeDescription> {
        let mut desc = ApplicationUpgradeDescription {
            name: self.name.clone(),
            target_version: self.type_version.clone(),
            parameters: self.parameters.clone(),
            force_restart: default_force_restart,
            ..Default::default()
        };
        let Some(policy) = &self.upgrade_policy else {
            return Ok(desc);
        };
        if let Some(force) = policy.force_restart {
            desc.force_restart = force;
        }
        if let Some(mode) = policy.upgrade_mode.as_deref().filter(|m| !m.trim().is_empty()) {
            desc.mode = mode.parse::<RollingUpgradeMode>()?;
        }
        desc.monitoring_policy = policy
            .monitoring_policy
            .as_ref()
            .and_then(MonitoringPolicyConfig::to_policy);
        desc.health_policy = policy
            .application_health_policy
            .as_ref()
            .and_then(HealthPolicyConfig::to_policy);
        Ok(desc)
    }
}

fn capacity_equivalent(
    a: &Option<ApplicationCapacityDescription>,
    b: &Option<ApplicationCapacityDescription>,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.equivalent(b),
        _ => false,
    }
}

fn identity_equivalent(
    a: &Option<ManagedApplicationIdentityDescription>,
    b: &Option<ManagedApplicationIdentityDescription>,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.equivalent(b),
        _ => false,
    }
}

/// `typeName|name`, or just the name when the type is unknown.
pub fn application_composite_id(type_name: &str, name: &str) -> String {
    if type_name.is_empty() {
        name.to_string()
    } else {
        format!("{}|{}", type_name, name)
    }
}

pub fn split_application_composite_id(id: &str) -> Option<(&str, &str)> {
    id.split_once('|')
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationState {
    pub id: String,
    pub name: String,
    pub type_name: String,
    pub type_version: String,
    pub parameters: HashMap<String, String>,
    pub status: String,
    pub health_state: String,
    pub application_capacity: Option<ApplicationCapacityDescription>,
    pub managed_application_identity: Option<ManagedApplicationIdentityDescription>,
}

impl From<ApplicationInfo> for ApplicationState {
    fn from(info: ApplicationInfo) -> Self {
        Self {
            id: application_composite_id(&info.type_name, &info.name),
            parameters: info.parameter_map(),
            name: info.name,
            type_name: info.type_name,
            type_version: info.type_version,
            status: info.status,
            health_state: info.health_state,
            application_capacity: info.capacity,
            managed_application_identity: info.managed_identity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApplicationResource {
    client: FabricClient,
    features: ProviderFeatures,
}

impl ApplicationResource {
    pub fn new(client: FabricClient, features: ProviderFeatures) -> Self {
        Self { client, features }
    }

    async fn refresh(&self, cancel: &CancellationToken, name: &str) -> Result<ApplicationState> {
        let info = self.client.get_application(cancel, name).await?;
        Ok(info.into())
    }
}

#[async_trait]
impl Resource for ApplicationResource {
    type Config = ApplicationConfig;
    type State = ApplicationState;

    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(
        &self,
        cancel: &CancellationToken,
        config: &ApplicationConfig,
    ) -> Result<ApplicationState> {
        let desc = config.to_description();
        // Parse the policy up front so a bad mode fails before anything is created.
        let upgrade = config.to_upgrade(true)?;

        match self.client.create_application(cancel, &desc).await {
            Ok(()) => {}
            Err(e)
                if self.features.application_recreate_on_upgrade
                    && e.is_application_already_exists() =>
            {
                tracing::warn!(
                    name = %config.name,
                    type_name = %config.type_name,
                    type_version = %config.type_version,
                    "application already exists, upgrading instead of creating"
                );
                self.client.upgrade_application(cancel, &upgrade).await?;
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            name = %config.name,
            type_name = %config.type_name,
            type_version = %config.type_version,
            "created application"
        );
        self.refresh(cancel, &config.name).await
    }

    async fn read(
        &self,
        cancel: &CancellationToken,
        state: &ApplicationState,
    ) -> Result<Option<ApplicationState>> {
        match self.refresh(cancel, &state.name).await {
            Ok(fresh) => Ok(Some(fresh)),
            Err(ProviderError::Fabric(e)) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn plan(&self, prior: &ApplicationConfig, desired: &ApplicationConfig) -> Result<Action> {
        let mut action = Action::no_op(
            RESOURCE_TYPE,
            application_composite_id(&prior.type_name, &prior.name),
        );
        if prior.name != desired.name {
            action.record("name", true);
        }
        if prior.type_name != desired.type_name {
            action.record("type_name", true);
        }
        if !capacity_equivalent(&prior.capacity(), &desired.capacity()) {
            action.record("application_capacity", true);
        }
        if !identity_equivalent(&prior.managed_identity(), &desired.managed_identity()) {
            action.record("managed_application_identity", true);
        }
        if prior.type_version != desired.type_version {
            action.record("type_version", false);
        }
        if prior.parameters != desired.parameters {
            action.record("parameters", false);
        }
        Ok(action)
    }

    async fn update(
        &self,
        cancel: &CancellationToken,
        prior: &ApplicationConfig,
        desired: &ApplicationConfig,
    ) -> Result<ApplicationState> {
        if prior.name != desired.name {
            return Err(ProviderError::replacement("name", "applications cannot be renamed"));
        }
        if prior.type_name != desired.type_name {
            return Err(ProviderError::replacement(
                "type_name",
                "recreate the application to switch application types",
            ));
        }
        if !capacity_equivalent(&prior.capacity(), &desired.capacity()) {
            return Err(ProviderError::replacement(
                "application_capacity",
                "capacity of an existing application cannot be updated",
            ));
        }
        if !identity_equivalent(&prior.managed_identity(), &desired.managed_identity()) {
            return Err(ProviderError::replacement(
                "managed_application_identity",
                "managed identity of an existing application cannot be updated",
            ));
        }

        let version_changed = prior.type_version != desired.type_version;
        let parameters_changed = prior.parameters != desired.parameters;
        if !version_changed && !parameters_changed {
            return self.refresh(cancel, &desired.name).await;
        }

        let upgrade = desired.to_upgrade(false)?;
        tracing::info!(
            name = %desired.name,
            type_version = %desired.type_version,
            version_changed,
            parameters_changed,
            "starting application upgrade"
        );
        self.client.upgrade_application(cancel, &upgrade).await?;
        self.refresh(cancel, &desired.name).await
    }

    async fn delete(
        &self,
        cancel: &CancellationToken,
        state: &ApplicationState,
    ) -> Result<DeleteOutcome> {
        match self.client.delete_application(cancel, &state.name, false).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.is_not_found() => Ok(DeleteOutcome::AlreadyGone),
            Err(e) => Err(e.into()),
        }
    }

    /// Accepts `typeName|name` or a bare application name.
    fn import(&self, id: &str) -> Result<ApplicationState> {
        if id.trim().is_empty() {
            return Err(ProviderError::InvalidConfig(
                "import id: an application name is required".to_string(),
            ));
        }
        let (type_name, name) = split_application_composite_id(id).unwrap_or(("", id));
        Ok(ApplicationState {
            id: application_composite_id(type_name, name),
            name: name.to_string(),
            type_name: type_name.to_string(),
            ..Default::default()
        })
    }
}
