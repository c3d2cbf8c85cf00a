//! Service lifecycle
//!
//! A service is either stateless or stateful. The cluster distinguishes the two
//! by the `ServiceKind` discriminator and each kind has its own field set, so
//! both descriptions and partial updates are modeled as two-variant enums.
//!
//! Partial updates carry a `Flags` bitmask naming the fields present. The bit
//! assignments differ per kind; see [`update_flag`].

use crate::client::FabricClient;
use crate::error::{ApiError, FabricError, Result};
use crate::naming::{application_id, application_name_from_service, service_id};
use crate::partition::{PartitionDescription, PartitionSpec};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize, Serializer};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    Stateless,
    Stateful,
}

impl ServiceKind {
    /// Case-insensitive `stateless` / `stateful`.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "stateless" => Some(ServiceKind::Stateless),
            "stateful" => Some(ServiceKind::Stateful),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Stateless => "Stateless",
            ServiceKind::Stateful => "Stateful",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveCost {
    Zero,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl std::str::FromStr for MoveCost {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zero" => Ok(MoveCost::Zero),
            "low" => Ok(MoveCost::Low),
            "medium" => Ok(MoveCost::Medium),
            "high" => Ok(MoveCost::High),
            "veryhigh" => Ok(MoveCost::VeryHigh),
            _ => Err(FabricError::Validation(format!(
                "unsupported default move cost {:?}",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServicePackageActivationMode {
    SharedProcess,
    ExclusiveProcess,
}

impl std::str::FromStr for ServicePackageActivationMode {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sharedprocess" => Ok(ServicePackageActivationMode::SharedProcess),
            "exclusiveprocess" => Ok(ServicePackageActivationMode::ExclusiveProcess),
            _ => Err(FabricError::Validation(format!(
                "unsupported service package activation mode {:?}",
                s
            ))),
        }
    }
}

/// Service configuration as declared, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    #[serde(default)]
    pub application_name: Option<String>,
    pub service_type_name: String,
    pub service_kind: String,
    #[serde(default)]
    pub partition: Option<PartitionSpec>,
    #[serde(default)]
    pub placement_constraints: Option<String>,
    #[serde(default)]
    pub default_move_cost: Option<String>,
    #[serde(default)]
    pub service_package_activation_mode: Option<String>,
    #[serde(default)]
    pub service_dns_name: Option<String>,
    #[serde(default)]
    pub stateless: Option<StatelessSpec>,
    #[serde(default)]
    pub stateful: Option<StatefulSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatelessSpec {
    /// `-1` places an instance on every node.
    #[serde(default)]
    pub instance_count: Option<i64>,
    #[serde(default)]
    pub min_instance_count: Option<i64>,
    #[serde(default)]
    pub min_instance_percentage: Option<i64>,
    #[serde(default)]
    pub instance_close_delay_seconds: Option<i64>,
    #[serde(default)]
    pub instance_restart_wait_seconds: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatefulSpec {
    #[serde(default)]
    pub target_replica_set_size: Option<i64>,
    #[serde(default)]
    pub min_replica_set_size: Option<i64>,
    #[serde(default)]
    pub has_persisted_state: Option<bool>,
    #[serde(default)]
    pub replica_restart_wait_seconds: Option<i64>,
    #[serde(default)]
    pub quorum_loss_wait_seconds: Option<i64>,
    #[serde(default)]
    pub stand_by_replica_keep_seconds: Option<i64>,
    #[serde(default)]
    pub service_placement_time_limit_seconds: Option<i64>,
}

impl ServiceSpec {
    /// Owning application, explicit or derived from the service name.
    pub fn application_name(&self) -> Result<String> {
        match self.application_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => application_name_from_service(&self.name),
        }
    }

    pub fn kind(&self) -> Result<ServiceKind> {
        ServiceKind::parse(&self.service_kind).ok_or_else(|| {
            FabricError::Validation(format!(
                "service kind {:?} must be either Stateful or Stateless",
                self.service_kind
            ))
        })
    }
}

/// Fields shared by both service kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCommon {
    #[serde(rename = "ApplicationName")]
    pub application_name: String,
    #[serde(rename = "ServiceName")]
    pub service_name: String,
    #[serde(rename = "ServiceTypeName")]
    pub service_type_name: String,
    #[serde(rename = "PartitionDescription")]
    pub partition: PartitionDescription,
    #[serde(rename = "PlacementConstraints", skip_serializing_if = "Option::is_none")]
    pub placement_constraints: Option<String>,
    #[serde(rename = "DefaultMoveCost", skip_serializing_if = "Option::is_none")]
    pub default_move_cost: Option<MoveCost>,
    #[serde(
        rename = "ServicePackageActivationMode",
        skip_serializing_if = "Option::is_none"
    )]
    pub service_package_activation_mode: Option<ServicePackageActivationMode>,
    #[serde(rename = "ServiceDnsName", skip_serializing_if = "Option::is_none")]
    pub service_dns_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatelessServiceDescription {
    #[serde(flatten)]
    pub common: ServiceCommon,
    #[serde(rename = "InstanceCount")]
    pub instance_count: i64,
    #[serde(rename = "MinInstanceCount", skip_serializing_if = "Option::is_none")]
    pub min_instance_count: Option<i64>,
    #[serde(rename = "MinInstancePercentage", skip_serializing_if = "Option::is_none")]
    pub min_instance_percentage: Option<i64>,
    #[serde(
        rename = "InstanceCloseDelayDurationSeconds",
        skip_serializing_if = "Option::is_none",
        serialize_with = "seconds"
    )]
    pub instance_close_delay_seconds: Option<i64>,
    #[serde(
        rename = "InstanceRestartWaitDurationSeconds",
        skip_serializing_if = "Option::is_none",
        serialize_with = "seconds"
    )]
    pub instance_restart_wait_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatefulServiceDescription {
    #[serde(flatten)]
    pub common: ServiceCommon,
    #[serde(rename = "TargetReplicaSetSize")]
    pub target_replica_set_size: i64,
    #[serde(rename = "MinReplicaSetSize")]
    pub min_replica_set_size: i64,
    #[serde(rename = "HasPersistedState")]
    pub has_persisted_state: bool,
    #[serde(
        rename = "ReplicaRestartWaitDurationSeconds",
        skip_serializing_if = "Option::is_none",
        serialize_with = "seconds"
    )]
    pub replica_restart_wait_seconds: Option<i64>,
    #[serde(
        rename = "QuorumLossWaitDurationSeconds",
        skip_serializing_if = "Option::is_none",
        serialize_with = "seconds"
    )]
    pub quorum_loss_wait_seconds: Option<i64>,
    #[serde(
        rename = "StandByReplicaKeepDurationSeconds",
        skip_serializing_if = "Option::is_none",
        serialize_with = "seconds"
    )]
    pub stand_by_replica_keep_seconds: Option<i64>,
    #[serde(
        rename = "ServicePlacementTimeLimitSeconds",
        skip_serializing_if = "Option::is_none",
        serialize_with = "seconds"
    )]
    pub service_placement_time_limit_seconds: Option<i64>,
}

/// Payload for `GetServices/$/Create`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "ServiceKind")]
pub enum ServiceDescription {
    Stateless(StatelessServiceDescription),
    Stateful(StatefulServiceDescription),
}

/// Durations are sent as strings of whole seconds.
fn seconds<S: Serializer>(value: &Option<i64>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_str(&v.to_string()),
        None => serializer.serialize_none(),
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ServiceDescription {
    pub fn from_spec(spec: &ServiceSpec) -> Result<Self> {
        let partition = spec
            .partition
            .as_ref()
            .ok_or_else(|| FabricError::Validation("partition must be provided".to_string()))?;
        let partition = PartitionDescription::from_spec(partition)?;
        let kind = spec.kind()?;

        let common = ServiceCommon {
            application_name: spec.application_name()?,
            service_name: spec.name.trim().to_string(),
            service_type_name: spec.service_type_name.trim().to_string(),
            partition,
            placement_constraints: spec.placement_constraints.clone(),
            default_move_cost: spec
                .default_move_cost
                .as_deref()
                .map(str::parse)
                .transpose()?,
            service_package_activation_mode: spec
                .service_package_activation_mode
                .as_deref()
                .map(str::parse)
                .transpose()?,
            service_dns_name: non_blank(&spec.service_dns_name),
        };
        if common.service_name.is_empty() {
            return Err(FabricError::Validation("service name required".to_string()));
        }
        if common.service_type_name.is_empty() {
            return Err(FabricError::Validation("service type name required".to_string()));
        }

        match kind {
            ServiceKind::Stateless => {
                let stateless = spec.stateless.as_ref().ok_or_else(|| {
                    FabricError::Validation(
                        "stateless configuration must be provided when service kind is Stateless"
                            .to_string(),
                    )
                })?;
                Ok(ServiceDescription::Stateless(StatelessServiceDescription {
                    common,
                    instance_count: stateless.instance_count.unwrap_or(-1),
                    min_instance_count: stateless.min_instance_count,
                    min_instance_percentage: stateless.min_instance_percentage,
                    instance_close_delay_seconds: stateless.instance_close_delay_seconds,
                    instance_restart_wait_seconds: stateless.instance_restart_wait_seconds,
                }))
            }
            ServiceKind::Stateful => {
                let stateful = spec.stateful.as_ref().ok_or_else(|| {
                    FabricError::Validation(
                        "stateful configuration must be provided when service kind is Stateful"
                            .to_string(),
                    )
                })?;
                let (Some(target), Some(min), Some(persisted)) = (
                    stateful.target_replica_set_size,
                    stateful.min_replica_set_size,
                    stateful.has_persisted_state,
                ) else {
                    return Err(FabricError::Validation(
                        "target_replica_set_size, min_replica_set_size, and has_persisted_state must be specified"
                            .to_string(),
                    ));
                };
                Ok(ServiceDescription::Stateful(StatefulServiceDescription {
                    common,
                    target_replica_set_size: target,
                    min_replica_set_size: min,
                    has_persisted_state: persisted,
                    replica_restart_wait_seconds: stateful.replica_restart_wait_seconds,
                    quorum_loss_wait_seconds: stateful.quorum_loss_wait_seconds,
                    stand_by_replica_keep_seconds: stateful.stand_by_replica_keep_seconds,
                    service_placement_time_limit_seconds: stateful
                        .service_placement_time_limit_seconds,
                }))
            }
        }
    }

    pub fn kind(&self) -> ServiceKind {
        match self {
            ServiceDescription::Stateless(_) => ServiceKind::Stateless,
            ServiceDescription::Stateful(_) => ServiceKind::Stateful,
        }
    }

    pub fn common(&self) -> &ServiceCommon {
        match self {
            ServiceDescription::Stateless(d) => &d.common,
            ServiceDescription::Stateful(d) => &d.common,
        }
    }
}

/// Fields a partial update can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateField {
    PlacementConstraints,
    DefaultMoveCost,
    ServiceDnsName,
    InstanceCount,
    MinInstanceCount,
    MinInstancePercentage,
    InstanceCloseDelayDuration,
    InstanceRestartWaitDuration,
    TargetReplicaSetSize,
    MinReplicaSetSize,
    ReplicaRestartWaitDuration,
    QuorumLossWaitDuration,
    StandByReplicaKeepDuration,
    ServicePlacementTimeLimit,
}

/// Bit announcing `field` in an update of a `kind` service, or `None` when that
/// kind has no such field.
pub fn update_flag(kind: ServiceKind, field: UpdateField) -> Option<u32> {
    use ServiceKind::*;
    use UpdateField::*;
    let bit = match (kind, field) {
        (Stateless, InstanceCount) => 0x0001,
        (Stateless, PlacementConstraints) => 0x0002,
        (Stateless, DefaultMoveCost) => 0x0020,
        (Stateless, MinInstanceCount) => 0x0080,
        (Stateless, MinInstancePercentage) => 0x0100,
        (Stateless, InstanceCloseDelayDuration) => 0x0200,
        (Stateless, InstanceRestartWaitDuration) => 0x0400,
        (Stateless, ServiceDnsName) => 0x0800,

        (Stateful, TargetReplicaSetSize) => 0x0001,
        (Stateful, ReplicaRestartWaitDuration) => 0x0002,
        (Stateful, QuorumLossWaitDuration) => 0x0004,
        (Stateful, StandByReplicaKeepDuration) => 0x0008,
        (Stateful, MinReplicaSetSize) => 0x0010,
        (Stateful, PlacementConstraints) => 0x0020,
        (Stateful, DefaultMoveCost) => 0x0200,
        (Stateful, ServicePlacementTimeLimit) => 0x0800,
        (Stateful, ServiceDnsName) => 0x2000,

        _ => return None,
    };
    Some(bit)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatelessServiceUpdate {
    #[serde(rename = "PlacementConstraints", skip_serializing_if = "Option::is_none")]
    pub placement_constraints: Option<String>,
    #[serde(rename = "DefaultMoveCost", skip_serializing_if = "Option::is_none")]
    pub default_move_cost: Option<MoveCost>,
    #[serde(rename = "ServiceDnsName", skip_serializing_if = "Option::is_none")]
    pub service_dns_name: Option<String>,
    #[serde(rename = "InstanceCount", skip_serializing_if = "Option::is_none")]
    pub instance_count: Option<i64>,
    #[serde(rename = "MinInstanceCount", skip_serializing_if = "Option::is_none")]
    pub min_instance_count: Option<i64>,
    #[serde(rename = "MinInstancePercentage", skip_serializing_if = "Option::is_none")]
    pub min_instance_percentage: Option<i64>,
    #[serde(
        rename = "InstanceCloseDelayDurationSeconds",
        skip_serializing_if = "Option::is_none",
        serialize_with = "seconds"
    )]
    pub instance_close_delay_seconds: Option<i64>,
    #[serde(
        rename = "InstanceRestartWaitDurationSeconds",
        skip_serializing_if = "Option::is_none",
        serialize_with = "seconds"
    )]
    pub instance_restart_wait_seconds: Option<i64>,
}

impl StatelessServiceUpdate {
    fn fields(&self) -> Vec<UpdateField> {
        let present = [
            (self.placement_constraints.is_some(), UpdateField::PlacementConstraints),
            (self.default_move_cost.is_some(), UpdateField::DefaultMoveCost),
            (self.service_dns_name.is_some(), UpdateField::ServiceDnsName),
            (self.instance_count.is_some(), UpdateField::InstanceCount),
            (self.min_instance_count.is_some(), UpdateField::MinInstanceCount),
            (self.min_instance_percentage.is_some(), UpdateField::MinInstancePercentage),
            (self.instance_close_delay_seconds.is_some(), UpdateField::InstanceCloseDelayDuration),
            (self.instance_restart_wait_seconds.is_some(), UpdateField::InstanceRestartWaitDuration),
        ];
        present.into_iter().filter(|(set, _)| *set).map(|(_, f)| f).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatefulServiceUpdate {
    #[serde(rename = "PlacementConstraints", skip_serializing_if = "Option::is_none")]
    pub placement_constraints: Option<String>,
    #[serde(rename = "DefaultMoveCost", skip_serializing_if = "Option::is_none")]
    pub default_move_cost: Option<MoveCost>,
    #[serde(rename = "ServiceDnsName", skip_serializing_if = "Option::is_none")]
    pub service_dns_name: Option<String>,
    #[serde(rename = "TargetReplicaSetSize", skip_serializing_if = "Option::is_none")]
    pub target_replica_set_size: Option<i64>,
    #[serde(rename = "MinReplicaSetSize", skip_serializing_if = "Option::is_none")]
    pub min_replica_set_size: Option<i64>,
    #[serde(
        rename = "ReplicaRestartWaitDurationSeconds",
        skip_serializing_if = "Option::is_none",
        serialize_with = "seconds"
    )]
    pub replica_restart_wait_seconds: Option<i64>,
    #[serde(
        rename = "QuorumLossWaitDurationSeconds",
        skip_serializing_if = "Option::is_none",
        serialize_with = "seconds"
    )]
    pub quorum_loss_wait_seconds: Option<i64>,
    #[serde(
        rename = "StandByReplicaKeepDurationSeconds",
        skip_serializing_if = "Option::is_none",
        serialize_with = "seconds"
    )]
    pub stand_by_replica_keep_seconds: Option<i64>,
    #[serde(
        rename = "ServicePlacementTimeLimitSeconds",
        skip_serializing_if = "Option::is_none",
        serialize_with = "seconds"
    )]
    pub service_placement_time_limit_seconds: Option<i64>,
}

impl StatefulServiceUpdate {
    fn fields(&self) -> Vec<UpdateField> {
        let present = [
            (self.placement_constraints.is_some(), UpdateField::PlacementConstraints),
            (self.default_move_cost.is_some(), UpdateField::DefaultMoveCost),
            (self.service_dns_name.is_some(), UpdateField::ServiceDnsName),
            (self.target_replica_set_size.is_some(), UpdateField::TargetReplicaSetSize),
            (self.min_replica_set_size.is_some(), UpdateField::MinReplicaSetSize),
            (self.replica_restart_wait_seconds.is_some(), UpdateField::ReplicaRestartWaitDuration),
            (self.quorum_loss_wait_seconds.is_some(), UpdateField::QuorumLossWaitDuration),
            (self.stand_by_replica_keep_seconds.is_some(), UpdateField::StandByReplicaKeepDuration),
            (
                self.service_placement_time_limit_seconds.is_some(),
                UpdateField::ServicePlacementTimeLimit,
            ),
        ];
        present.into_iter().filter(|(set, _)| *set).map(|(_, f)| f).collect()
    }
}

/// A partial service update. Only fields that are `Some` are sent.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceUpdateDescription {
    Stateless(StatelessServiceUpdate),
    Stateful(StatefulServiceUpdate),
}

#[derive(Serialize)]
struct UpdateRequest<'a, T: Serialize> {
    #[serde(rename = "ServiceKind")]
    kind: &'static str,
    #[serde(rename = "Flags")]
    flags: String,
    #[serde(flatten)]
    fields: &'a T,
}

/// `desired` when it is set and differs from `prior`.
fn changed<T: PartialEq + Clone>(prior: &Option<T>, desired: &Option<T>) -> Option<T> {
    match desired {
        Some(v) if prior.as_ref() != Some(v) => Some(v.clone()),
        _ => None,
    }
}

impl ServiceUpdateDescription {
    pub fn kind(&self) -> ServiceKind {
        match self {
            ServiceUpdateDescription::Stateless(_) => ServiceKind::Stateless,
            ServiceUpdateDescription::Stateful(_) => ServiceKind::Stateful,
        }
    }

    pub fn fields(&self) -> Vec<UpdateField> {
        match self {
            ServiceUpdateDescription::Stateless(u) => u.fields(),
            ServiceUpdateDescription::Stateful(u) => u.fields(),
        }
    }

    pub fn flags(&self) -> u32 {
        let kind = self.kind();
        self.fields()
            .into_iter()
            .filter_map(|field| update_flag(kind, field))
            .fold(0, |acc, bit| acc | bit)
    }

    pub fn is_empty(&self) -> bool {
        self.flags() == 0
    }

    /// Update carrying only the fields whose desired value differs from the
    /// prior configuration. Both configurations must be of the same kind.
    pub fn from_changes(prior: &ServiceSpec, desired: &ServiceSpec) -> Result<Self> {
        let kind = desired.kind()?;
        if prior.kind()? != kind {
            return Err(FabricError::Validation(format!(
                "service kind cannot change from {} to {} in place",
                prior.service_kind, desired.service_kind
            )));
        }

        let placement_constraints =
            changed(&prior.placement_constraints, &desired.placement_constraints);
        let service_dns_name = changed(
            &non_blank(&prior.service_dns_name),
            &non_blank(&desired.service_dns_name),
        );
        let prior_cost: Option<MoveCost> = prior
            .default_move_cost
            .as_deref()
            .map(str::parse)
            .transpose()?;
        let desired_cost: Option<MoveCost> = desired
            .default_move_cost
            .as_deref()
            .map(str::parse)
            .transpose()?;
        let default_move_cost = changed(&prior_cost, &desired_cost);

        Ok(match kind {
            ServiceKind::Stateless => {
                let old = prior.stateless.clone().unwrap_or_default();
                let new = desired.stateless.clone().unwrap_or_default();
                ServiceUpdateDescription::Stateless(StatelessServiceUpdate {
                    placement_constraints,
                    default_move_cost,
                    service_dns_name,
                    instance_count: changed(&old.instance_count, &new.instance_count),
                    min_instance_count: changed(&old.min_instance_count, &new.min_instance_count),
                    min_instance_percentage: changed(
                        &old.min_instance_percentage,
                        &new.min_instance_percentage,
                    ),
                    instance_close_delay_seconds: changed(
                        &old.instance_close_delay_seconds,
                        &new.instance_close_delay_seconds,
                    ),
                    instance_restart_wait_seconds: changed(
                        &old.instance_restart_wait_seconds,
                        &new.instance_restart_wait_seconds,
                    ),
                })
            }
            ServiceKind::Stateful => {
                let old = prior.stateful.clone().unwrap_or_default();
                let new = desired.stateful.clone().unwrap_or_default();
                ServiceUpdateDescription::Stateful(StatefulServiceUpdate {
                    placement_constraints,
                    default_move_cost,
                    service_dns_name,
                    target_replica_set_size: changed(
                        &old.target_replica_set_size,
                        &new.target_replica_set_size,
                    ),
                    min_replica_set_size: changed(
                        &old.min_replica_set_size,
                        &new.min_replica_set_size,
                    ),
                    replica_restart_wait_seconds: changed(
                        &old.replica_restart_wait_seconds,
                        &new.replica_restart_wait_seconds,
                    ),
                    quorum_loss_wait_seconds: changed(
                        &old.quorum_loss_wait_seconds,
                        &new.quorum_loss_wait_seconds,
                    ),
                    stand_by_replica_keep_seconds: changed(
                        &old.stand_by_replica_keep_seconds,
                        &new.stand_by_replica_keep_seconds,
                    ),
                    service_placement_time_limit_seconds: changed(
                        &old.service_placement_time_limit_seconds,
                        &new.service_placement_time_limit_seconds,
                    ),
                })
            }
        })
    }

    /// The JSON body sent to `$/Update`, with the bitmask as a decimal string.
    pub fn to_payload(&self) -> Result<serde_json::Value> {
        let flags = self.flags().to_string();
        let kind = self.kind().as_str();
        let payload = match self {
            ServiceUpdateDescription::Stateless(fields) => {
                serde_json::to_value(UpdateRequest { kind, flags, fields })
            }
            ServiceUpdateDescription::Stateful(fields) => {
                serde_json::to_value(UpdateRequest { kind, flags, fields })
            }
        };
        payload.map_err(|e| FabricError::Validation(format!("encode service update: {}", e)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServiceMetadata {
    #[serde(rename = "ArmMetadata", default)]
    pub arm_metadata: Option<ArmMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArmMetadata {
    #[serde(rename = "ArmResourceId", default)]
    pub arm_resource_id: String,
}

/// A service as reported by the cluster.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServiceInfo {
    #[serde(rename = "Id", default)]
    pub id: String,
    #[serde(rename = "ServiceKind", default)]
    pub service_kind: String,
    #[serde(rename = "Kind", default)]
    pub kind: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "TypeName", default)]
    pub type_name: String,
    #[serde(rename = "ManifestVersion", default)]
    pub manifest_version: String,
    #[serde(rename = "HealthState", default)]
    pub health_state: String,
    #[serde(rename = "ServiceStatus", default)]
    pub service_status: String,
    #[serde(rename = "IsServiceGroup", default)]
    pub is_service_group: bool,
    #[serde(rename = "HasPersistedState", default)]
    pub has_persisted_state: Option<bool>,
    #[serde(rename = "ServiceMetadata", default)]
    pub service_metadata: Option<ServiceMetadata>,
}

impl ServiceInfo {
    /// `ServiceKind`, falling back to `Kind`.
    pub fn kind(&self) -> &str {
        if self.service_kind.is_empty() {
            &self.kind
        } else {
            &self.service_kind
        }
    }

    pub fn arm_resource_id(&self) -> Option<&str> {
        self.service_metadata
            .as_ref()
            .and_then(|m| m.arm_metadata.as_ref())
            .map(|a| a.arm_resource_id.as_str())
            .filter(|id| !id.is_empty())
    }
}

impl FabricClient {
    pub async fn create_service(
        &self,
        cancel: &CancellationToken,
        desc: &ServiceDescription,
    ) -> Result<()> {
        let common = desc.common();
        let app_id = application_id(&common.application_name);
        let response = self
            .send_json(
                cancel,
                Method::POST,
                &["Applications", &app_id, "$", "GetServices", "$", "Create"],
                &[],
                desc,
            )
            .await?;
        self.complete(cancel, response).await?;
        tracing::info!(
            name = %common.service_name,
            kind = %desc.kind(),
            partition = common.partition.scheme(),
            "created service"
        );
        Ok(())
    }

    /// Apply a partial update. Returns `false` without calling the cluster
    /// when the update carries no fields.
    pub async fn update_service(
        &self,
        cancel: &CancellationToken,
        service_name: &str,
        update: &ServiceUpdateDescription,
    ) -> Result<bool> {
        if update.is_empty() {
            tracing::debug!(name = service_name, "service update has no changes");
            return Ok(false);
        }
        let id = service_id(service_name);
        let payload = update.to_payload()?;
        let response = self
            .send_json(
                cancel,
                Method::POST,
                &["Services", &id, "$", "Update"],
                &[],
                &payload,
            )
            .await?;
        self.complete(cancel, response).await?;
        tracing::info!(name = service_name, flags = update.flags(), "updated service");
        Ok(true)
    }

    pub async fn delete_service(
        &self,
        cancel: &CancellationToken,
        service_name: &str,
        force: bool,
    ) -> Result<()> {
        let id = service_id(service_name);
        let query: &[(&str, &str)] = if force { &[("ForceRemove", "true")] } else { &[] };
        let response = self
            .send_empty(cancel, Method::POST, &["Services", &id, "$", "Delete"], query)
            .await?;
        self.complete(cancel, response).await?;
        tracing::info!(name = service_name, force, "deleted service");
        Ok(())
    }

    /// Read one service of an application. `204 No Content` is reported as a 404.
    pub async fn get_service(
        &self,
        cancel: &CancellationToken,
        application_name: &str,
        service_name: &str,
    ) -> Result<ServiceInfo> {
        let app_id = application_id(application_name);
        let id = service_id(service_name);
        let segments = ["Applications", app_id.as_str(), "$", "GetServices", id.as_str()];
        let response = self.send_empty(cancel, Method::GET, &segments, &[]).await?;
        if response.status() == StatusCode::NO_CONTENT {
            self.drain(cancel, response).await?;
            let path = format!("/{}", segments.join("/"));
            return Err(ApiError::not_found("GET", &path, "service not found").into());
        }
        self.decode(cancel, response, "service response").await
    }

    /// Services of an application, optionally only those of one service type.
    pub async fn list_services(
        &self,
        cancel: &CancellationToken,
        application_name: &str,
        service_type_name: &str,
    ) -> Result<Vec<ServiceInfo>> {
        let app_id = application_id(application_name);
        let query: Vec<(&str, &str)> = if service_type_name.is_empty() {
            Vec::new()
        } else {
            vec![("ServiceTypeName", service_type_name)]
        };
        self.get_paged(
            cancel,
            &["Applications", &app_id, "$", "GetServices"],
            &query,
            "services",
        )
        .await
    }
}
