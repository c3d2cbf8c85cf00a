//! Service resource

use super::{DeleteOutcome, Resource};
use crate::action::Action;
use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use fabricflow_client::{
    FabricClient, PartitionDescription, ServiceDescription, ServiceInfo,
    ServicePackageActivationMode, ServiceSpec, ServiceUpdateDescription, UpdateField,
    application_name_from_service,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

const RESOURCE_TYPE: &str = "service";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(flatten)]
    pub spec: ServiceSpec,
    /// Delete with `ForceRemove`, skipping graceful replica shutdown.
    #[serde(default)]
    pub force_remove: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    pub id: String,
    pub name: String,
    pub application_name: String,
    pub service_type_name: String,
    pub service_kind: String,
    pub health_state: Option<String>,
    pub service_status: Option<String>,
    pub force_remove: bool,
}

impl ServiceState {
    fn from_config(config: &ServiceConfig) -> Result<Self> {
        Ok(Self {
            id: config.spec.name.clone(),
            name: config.spec.name.clone(),
            application_name: config.spec.application_name()?,
            service_type_name: config.spec.service_type_name.clone(),
            service_kind: config.spec.service_kind.clone(),
            health_state: None,
            service_status: None,
            force_remove: config.force_remove,
        })
    }

    fn apply(&mut self, info: ServiceInfo) {
        if let Ok(app) = application_name_from_service(&info.name) {
            self.application_name = app;
        }
        if !info.type_name.is_empty() {
            self.service_type_name = info.type_name.clone();
        }
        if !info.kind().is_empty() {
            self.service_kind = info.kind().to_string();
        }
        self.health_state = Some(info.health_state).filter(|v| !v.is_empty());
        self.service_status = Some(info.service_status).filter(|v| !v.is_empty());
        self.id = info.name.clone();
        self.name = info.name;
    }
}

fn field_attribute(field: UpdateField) -> &'static str {
    match field {
        UpdateField::PlacementConstraints => "placement_constraints",
        UpdateField::DefaultMoveCost => "default_move_cost",
        UpdateField::ServiceDnsName => "service_dns_name",
        UpdateField::InstanceCount => "stateless.instance_count",
        UpdateField::MinInstanceCount => "stateless.min_instance_count",
        UpdateField::MinInstancePercentage => "stateless.min_instance_percentage",
        UpdateField::InstanceCloseDelayDuration => "stateless.instance_close_delay_seconds",
        UpdateField::InstanceRestartWaitDuration => "stateless.instance_restart_wait_seconds",
        UpdateField::TargetReplicaSetSize => "stateful.target_replica_set_size",
        UpdateField::MinReplicaSetSize => "stateful.min_replica_set_size",
        UpdateField::ReplicaRestartWaitDuration => "stateful.replica_restart_wait_seconds",
        UpdateField::QuorumLossWaitDuration => "stateful.quorum_loss_wait_seconds",
        UpdateField::StandByReplicaKeepDuration => "stateful.stand_by_replica_keep_seconds",
        UpdateField::ServicePlacementTimeLimit => "stateful.service_placement_time_limit_seconds",
    }
}

fn activation_mode(spec: &ServiceSpec) -> Result<Option<ServicePackageActivationMode>> {
    Ok(spec
        .service_package_activation_mode
        .as_deref()
        .map(str::parse)
        .transpose()?)
}

fn partition(spec: &ServiceSpec) -> Result<Option<PartitionDescription>> {
    Ok(spec
        .partition
        .as_ref()
        .map(PartitionDescription::from_spec)
        .transpose()?)
}

/// Attributes whose change forces a new service.
fn replacing_changes(prior: &ServiceSpec, desired: &ServiceSpec) -> Result<Vec<&'static str>> {
    let mut changed = Vec::new();
    if prior.name.trim() != desired.name.trim() {
        changed.push("name");
    }
    if prior.application_name()? != desired.application_name()? {
        changed.push("application_name");
    }
    if prior.service_type_name.trim() != desired.service_type_name.trim() {
        changed.push("service_type_name");
    }
    if prior.kind()? != desired.kind()? {
        changed.push("service_kind");
    }
    if partition(prior)? != partition(desired)? {
        changed.push("partition");
    }
    if activation_mode(prior)? != activation_mode(desired)? {
        changed.push("service_package_activation_mode");
    }
    Ok(changed)
}

#[derive(Debug, Clone)]
pub struct ServiceResource {
    client: FabricClient,
}

impl ServiceResource {
    pub fn new(client: FabricClient) -> Self {
        Self { client }
    }

    /// Re-read after a write. The cluster may not list a new service yet, so
    /// a miss keeps the seeded state.
    async fn settle(&self, cancel: &CancellationToken, mut state: ServiceState) -> Result<ServiceState> {
        match self
            .client
            .get_service(cancel, &state.application_name, &state.name)
            .await
        {
            Ok(info) => {
                state.apply(info);
                Ok(state)
            }
            Err(e) if e.is_not_found() => Ok(state),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Resource for ServiceResource {
    type Config = ServiceConfig;
    type State = ServiceState;

    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(&self, cancel: &CancellationToken, config: &ServiceConfig) -> Result<ServiceState> {
        let desc = ServiceDescription::from_spec(&config.spec)?;
        self.client.create_service(cancel, &desc).await?;
        self.settle(cancel, ServiceState::from_config(config)?).await
    }

    async fn read(
        &self,
        cancel: &CancellationToken,
        state: &ServiceState,
    ) -> Result<Option<ServiceState>> {
        let application_name = if state.application_name.is_empty() {
            application_name_from_service(&state.name)?
        } else {
            state.application_name.clone()
        };
        match self
            .client
            .get_service(cancel, &application_name, &state.name)
            .await
        {
            Ok(info) => {
                let mut fresh = ServiceState {
                    application_name,
                    ..state.clone()
                };
                fresh.apply(info);
                Ok(Some(fresh))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn plan(&self, prior: &ServiceConfig, desired: &ServiceConfig) -> Result<Action> {
        let mut action = Action::no_op(RESOURCE_TYPE, prior.spec.name.clone());
        let replacing = replacing_changes(&prior.spec, &desired.spec)?;
        for attribute in &replacing {
            action.record(attribute, true);
        }
        if replacing.is_empty() {
            let update = ServiceUpdateDescription::from_changes(&prior.spec, &desired.spec)?;
            for field in update.fields() {
                action.record(field_attribute(field), false);
            }
        }
        if prior.force_remove != desired.force_remove {
            action.record("force_remove", false);
        }
        Ok(action)
    }

    async fn update(
        &self,
        cancel: &CancellationToken,
        prior: &ServiceConfig,
        desired: &ServiceConfig,
    ) -> Result<ServiceState> {
        if let Some(attribute) = replacing_changes(&prior.spec, &desired.spec)?.first() {
            return Err(ProviderError::replacement(
                attribute,
                "this attribute is fixed when the service is created",
            ));
        }

        let update = ServiceUpdateDescription::from_changes(&prior.spec, &desired.spec)?;
        let sent = self
            .client
            .update_service(cancel, &desired.spec.name, &update)
            .await?;
        if sent {
            tracing::info!(
                name = %desired.spec.name,
                kind = %update.kind(),
                flags = update.flags(),
                "updated service"
            );
        }
        self.settle(cancel, ServiceState::from_config(desired)?).await
    }

    async fn delete(&self, cancel: &CancellationToken, state: &ServiceState) -> Result<DeleteOutcome> {
        match self
            .client
            .delete_service(cancel, &state.name, state.force_remove)
            .await
        {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.is_not_found() => Ok(DeleteOutcome::AlreadyGone),
            Err(e) => Err(e.into()),
        }
    }

    /// Import identifiers are full service names.
    fn import(&self, id: &str) -> Result<ServiceState> {
        let application_name = application_name_from_service(id)?;
        Ok(ServiceState {
            id: id.to_string(),
            name: id.to_string(),
            application_name,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;
    use fabricflow_client::{ClientConfig, PartitionSpec, StatefulSpec};

    fn resource() -> ServiceResource {
        let client = FabricClient::new(ClientConfig::new("http://127.0.0.1:19080"), None).unwrap();
        ServiceResource::new(client)
    }

    fn stateful() -> ServiceConfig {
        ServiceConfig {
            spec: ServiceSpec {
                name: "fabric:/Shop/Cart".into(),
                service_type_name: "CartType".into(),
                service_kind: "Stateful".into(),
                partition: Some(PartitionSpec {
                    scheme: "Named".into(),
                    names: Some(vec!["a".into(), "b".into()]),
                    ..Default::default()
                }),
                stateful: Some(StatefulSpec {
                    target_replica_set_size: Some(3),
                    min_replica_set_size: Some(2),
                    has_persisted_state: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
            force_remove: false,
        }
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
name: fabric:/Shop/Web
service_type_name: WebType
service_kind: stateless
default_move_cost: Low
force_remove: true
partition:
  scheme: singleton
stateless:
  instance_count: 3
"#;
        let config: ServiceConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.force_remove);
        assert_eq!(config.spec.default_move_cost.as_deref(), Some("Low"));
        assert_eq!(
            config.spec.stateless.as_ref().and_then(|s| s.instance_count),
            Some(3)
        );
        assert!(ServiceDescription::from_spec(&config.spec).is_ok());
    }

    #[test]
    fn test_plan_updates_changed_fields_only() {
        let prior = stateful();
        let mut desired = stateful();
        if let Some(s) = desired.spec.stateful.as_mut() {
            s.target_replica_set_size = Some(5);
        }
        let action = resource().plan(&prior, &desired).unwrap();
        assert_eq!(action.action_type, ActionType::Update);
        assert_eq!(action.changes, vec!["stateful.target_replica_set_size".to_string()]);
    }

    #[test]
    fn test_plan_partition_change_replaces() {
        let prior = stateful();
        let mut desired = stateful();
        desired.spec.partition = Some(PartitionSpec {
            scheme: "Named".into(),
            names: Some(vec!["a".into(), "b".into(), "c".into()]),
            ..Default::default()
        });
        let action = resource().plan(&prior, &desired).unwrap();
        assert_eq!(action.action_type, ActionType::Replace);
        assert_eq!(action.changes, vec!["partition".to_string()]);
    }

    #[test]
    fn test_plan_kind_case_is_not_a_change() {
        let prior = stateful();
        let mut desired = stateful();
        desired.spec.service_kind = "STATEFUL".into();
        assert_eq!(resource().plan(&prior, &desired).unwrap().action_type, ActionType::NoOp);
    }

    #[test]
    fn test_import_derives_application() {
        let state = resource().import("fabric:/Shop/Cart").unwrap();
        assert_eq!(state.application_name, "fabric:/Shop");
        assert!(resource().import("fabric:/Cart").is_err());
    }

    #[tokio::test]
    async fn test_kind_change_requires_replacement() {
        let mut desired = stateful();
        desired.spec.service_kind = "Stateless".into();
        let err = resource()
            .update(&CancellationToken::new(), &stateful(), &desired)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RequiresReplacement { ref attribute, .. } if attribute == "service_kind"));
    }
}
