//! Rolling application upgrades
//!
//! Starting an upgrade while another one is running on the same application
//! fails with `FABRIC_E_APPLICATION_UPGRADE_IN_PROGRESS`. That conflict is a
//! state transition: wait for the running upgrade to settle, then start ours
//! once more. Every path ends by waiting for a terminal upgrade state.

use crate::client::FabricClient;
use crate::error::{FabricError, Result};
use crate::naming::application_id;
use crate::parameters::{NameValueParameter, to_parameter_list};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

pub const UPGRADE_KIND_ROLLING: &str = "Rolling";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollingUpgradeMode {
    #[default]
    UnmonitoredAuto,
    UnmonitoredManual,
    Monitored,
}

impl std::str::FromStr for RollingUpgradeMode {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unmonitoredauto" => Ok(RollingUpgradeMode::UnmonitoredAuto),
            "unmonitoredmanual" => Ok(RollingUpgradeMode::UnmonitoredManual),
            "monitored" => Ok(RollingUpgradeMode::Monitored),
            _ => Err(FabricError::Validation(format!(
                "unsupported rolling upgrade mode {:?}",
                s
            ))),
        }
    }
}

/// Health monitoring for `Monitored` upgrades. Durations are passed through as
/// given (ISO-8601 or milliseconds).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingUpgradeMonitoringPolicy {
    #[serde(rename = "FailureAction", default, skip_serializing_if = "String::is_empty")]
    pub failure_action: String,
    #[serde(
        rename = "HealthCheckWaitDurationInMilliseconds",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub health_check_wait_duration: String,
    #[serde(
        rename = "HealthCheckStableDurationInMilliseconds",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub health_check_stable_duration: String,
    #[serde(
        rename = "HealthCheckRetryTimeoutInMilliseconds",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub health_check_retry_timeout: String,
    #[serde(
        rename = "UpgradeTimeoutInMilliseconds",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub upgrade_timeout: String,
    #[serde(
        rename = "UpgradeDomainTimeoutInMilliseconds",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub upgrade_domain_timeout: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationHealthPolicy {
    #[serde(rename = "ConsiderWarningAsError", default)]
    pub consider_warning_as_error: bool,
    #[serde(
        rename = "MaxPercentUnhealthyDeployedApplications",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub max_percent_unhealthy_deployed_applications: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationUpgradeDescription {
    pub name: String,
    pub target_version: String,
    pub parameters: HashMap<String, String>,
    pub mode: RollingUpgradeMode,
    pub force_restart: bool,
    pub monitoring_policy: Option<RollingUpgradeMonitoringPolicy>,
    pub health_policy: Option<ApplicationHealthPolicy>,
}

#[derive(Debug, Serialize)]
struct UpgradeRequest<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "TargetApplicationTypeVersion")]
    target_version: &'a str,
    #[serde(rename = "Parameters", skip_serializing_if = "Vec::is_empty")]
    parameters: Vec<NameValueParameter>,
    #[serde(rename = "UpgradeKind")]
    upgrade_kind: &'static str,
    #[serde(rename = "RollingUpgradeMode")]
    mode: RollingUpgradeMode,
    #[serde(rename = "ForceRestart", skip_serializing_if = "std::ops::Not::not")]
    force_restart: bool,
    #[serde(rename = "MonitoringPolicy", skip_serializing_if = "Option::is_none")]
    monitoring_policy: Option<&'a RollingUpgradeMonitoringPolicy>,
    #[serde(rename = "ApplicationHealthPolicy", skip_serializing_if = "Option::is_none")]
    health_policy: Option<&'a ApplicationHealthPolicy>,
}

impl<'a> From<&'a ApplicationUpgradeDescription> for UpgradeRequest<'a> {
    fn from(desc: &'a ApplicationUpgradeDescription) -> Self {
        Self {
            name: &desc.name,
            target_version: &desc.target_version,
            parameters: to_parameter_list(&desc.parameters),
            upgrade_kind: UPGRADE_KIND_ROLLING,
            mode: desc.mode,
            force_restart: desc.force_restart,
            monitoring_policy: desc.monitoring_policy.as_ref(),
            health_policy: desc.health_policy.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationUpgradeProgress {
    #[serde(rename = "UpgradeState", default)]
    pub upgrade_state: String,
    #[serde(rename = "FailureReason", default)]
    pub failure_reason: String,
    #[serde(rename = "UpgradeStatusDetails", default)]
    pub upgrade_status_details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeOutcome {
    Completed,
    Failed,
    InProgress,
}

impl ApplicationUpgradeProgress {
    /// An empty state is what clusters report once no upgrade is tracked.
    pub fn outcome(&self) -> UpgradeOutcome {
        match self.upgrade_state.as_str() {
            "RollingForwardCompleted" | "" => UpgradeOutcome::Completed,
            "RollingBackCompleted" | "Failed" => UpgradeOutcome::Failed,
            _ => UpgradeOutcome::InProgress,
        }
    }
}

/// Steps of [`FabricClient::upgrade_application`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpgradeStep {
    Start { retried: bool },
    AwaitInFlight,
    AwaitCompletion,
}

impl FabricClient {
    /// Start a rolling upgrade and wait for it to finish.
    pub async fn upgrade_application(
        &self,
        cancel: &CancellationToken,
        desc: &ApplicationUpgradeDescription,
    ) -> Result<()> {
        if desc.name.trim().is_empty() {
            return Err(FabricError::Validation("application name required".to_string()));
        }

        let mut step = UpgradeStep::Start { retried: false };
        loop {
            step = match step {
                UpgradeStep::Start { retried } => match self.start_upgrade(cancel, desc).await {
                    Ok(()) => {
                        tracing::info!(
                            name = %desc.name,
                            target_version = %desc.target_version,
                            force_restart = desc.force_restart,
                            "application upgrade started"
                        );
                        UpgradeStep::AwaitCompletion
                    }
                    Err(e) if !retried && e.is_application_upgrade_in_progress() => {
                        tracing::warn!(
                            name = %desc.name,
                            "another upgrade is in progress, waiting for it to finish"
                        );
                        UpgradeStep::AwaitInFlight
                    }
                    Err(e) => return Err(e),
                },
                UpgradeStep::AwaitInFlight => {
                    self.wait_for_application_upgrade(cancel, &desc.name).await?;
                    UpgradeStep::Start { retried: true }
                }
                UpgradeStep::AwaitCompletion => {
                    self.wait_for_application_upgrade(cancel, &desc.name).await?;
                    tracing::info!(name = %desc.name, "application upgrade completed");
                    return Ok(());
                }
            };
        }
    }

    async fn start_upgrade(
        &self,
        cancel: &CancellationToken,
        desc: &ApplicationUpgradeDescription,
    ) -> Result<()> {
        let id = application_id(&desc.name);
        let response = self
            .send_json(
                cancel,
                Method::POST,
                &["Applications", &id, "$", "Upgrade"],
                &[],
                &UpgradeRequest::from(desc),
            )
            .await?;
        self.drain(cancel, response).await
    }

    pub async fn get_application_upgrade_progress(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<ApplicationUpgradeProgress> {
        let id = application_id(name);
        let response = self
            .send_empty(
                cancel,
                Method::GET,
                &["Applications", &id, "$", "GetUpgradeProgress"],
                &[],
            )
            .await?;
        self.decode(cancel, response, "upgrade progress").await
    }

    /// Poll upgrade progress until a terminal state. An application that
    /// disappears mid-upgrade counts as done.
    pub async fn wait_for_application_upgrade(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(self.timings().upgrade_poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            let progress = match self.get_application_upgrade_progress(cancel, name).await {
                Ok(progress) => progress,
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e),
            };

            match progress.outcome() {
                UpgradeOutcome::Completed => return Ok(()),
                UpgradeOutcome::Failed => {
                    return Err(FabricError::UpgradeFailed {
                        state: progress.upgrade_state,
                        details: progress.upgrade_status_details,
                    });
                }
                UpgradeOutcome::InProgress => {
                    tracing::debug!(name, state = %progress.upgrade_state, "upgrade in progress");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(FabricError::Cancelled),
                _ = ticker.tick() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(state: &str) -> ApplicationUpgradeProgress {
        ApplicationUpgradeProgress {
            upgrade_state: state.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_outcomes() {
        assert_eq!(progress("RollingForwardCompleted").outcome(), UpgradeOutcome::Completed);
        assert_eq!(progress("").outcome(), UpgradeOutcome::Completed);
        assert_eq!(progress("RollingBackCompleted").outcome(), UpgradeOutcome::Failed);
        assert_eq!(progress("Failed").outcome(), UpgradeOutcome::Failed);
        for state in [
            "RollingForwardInProgress",
            "RollingForwardPending",
            "RollingBackInProgress",
            "Invalid",
            "SomethingNew",
        ] {
            assert_eq!(progress(state).outcome(), UpgradeOutcome::InProgress);
        }
    }

    #[test]
    fn test_request_defaults() {
        let desc = ApplicationUpgradeDescription {
            name: "fabric:/Shop".into(),
            target_version: "2.0.0".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(UpgradeRequest::from(&desc)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Name": "fabric:/Shop",
                "TargetApplicationTypeVersion": "2.0.0",
                "UpgradeKind": "Rolling",
                "RollingUpgradeMode": "UnmonitoredAuto"
            })
        );
    }

    #[test]
    fn test_request_with_policies() {
        let desc = ApplicationUpgradeDescription {
            name: "fabric:/Shop".into(),
            target_version: "2.0.0".into(),
            parameters: [("k".to_string(), "v".to_string())].into_iter().collect(),
            mode: RollingUpgradeMode::Monitored,
            force_restart: true,
            monitoring_policy: Some(RollingUpgradeMonitoringPolicy {
                failure_action: "Rollback".into(),
                upgrade_timeout: "PT1H".into(),
                ..Default::default()
            }),
            health_policy: Some(ApplicationHealthPolicy {
                consider_warning_as_error: true,
                max_percent_unhealthy_deployed_applications: Some(10),
            }),
        };
        let json = serde_json::to_value(UpgradeRequest::from(&desc)).unwrap();
        assert_eq!(json["ForceRestart"], true);
        assert_eq!(json["RollingUpgradeMode"], "Monitored");
        assert_eq!(json["Parameters"][0]["Key"], "k");
        assert_eq!(
            json["MonitoringPolicy"],
            serde_json::json!({"FailureAction": "Rollback", "UpgradeTimeoutInMilliseconds": "PT1H"})
        );
        assert_eq!(
            json["ApplicationHealthPolicy"]["MaxPercentUnhealthyDeployedApplications"],
            10
        );
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(
            "unmonitoredmanual".parse::<RollingUpgradeMode>().unwrap(),
            RollingUpgradeMode::UnmonitoredManual
        );
        assert!("blue-green".parse::<RollingUpgradeMode>().is_err());
    }
}
