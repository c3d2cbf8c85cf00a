//! Service Fabric cluster client for FabricFlow
//!
//! This crate talks to the cluster management REST API and turns its
//! asynchronous lifecycle operations into calls that return once the cluster
//! has settled.
//!
//! # Features
//!
//! - Application type provisioning and unprovisioning
//! - Application create/read/delete, including the `202 Accepted` materialization window
//! - Rolling application upgrades with conflict retry and progress tracking
//! - Stateless and stateful services with flag-based partial updates
//! - Service type lookups
//!
//! Every operation takes a [`CancellationToken`](tokio_util::sync::CancellationToken);
//! cancelling it aborts in-flight requests and polling sleeps with
//! [`FabricError::Cancelled`].
//!
//! # Example
//!
//! ```ignore
//! use fabricflow_client::{ClientConfig, CertificateAuthenticator, FabricClient};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let auth = CertificateAuthenticator::from_files("client.pem".as_ref(), None)?;
//! let client = FabricClient::new(
//!     ClientConfig::new("https://cluster.example.com:19080"),
//!     Some(Arc::new(auth)),
//! )?;
//!
//! let cancel = CancellationToken::new();
//! client
//!     .provision_application_type(&cancel, "Shop", "1.0.0", "https://store/shop.sfpkg")
//!     .await?;
//! let app = client.get_application(&cancel, "fabric:/Shop").await?;
//! ```

pub mod application;
pub mod application_type;
pub mod auth;
pub mod client;
pub mod error;
pub mod naming;
pub mod parameters;
pub mod partition;
pub mod poller;
pub mod service;
pub mod service_type;
pub mod upgrade;

pub use application::{
    ApplicationCapacityDescription, ApplicationDescription, ApplicationInfo,
    ApplicationMetricDescription, IdentityReference, ManagedApplicationIdentityDescription,
};
pub use application_type::ApplicationTypeInfo;
pub use auth::{
    Authenticator, BearerAuthenticator, CertificateAuthenticator, StaticTokenSource, TokenSource,
};
pub use client::{ClientConfig, DEFAULT_API_VERSION, FabricClient, PollTimings};
pub use error::{ApiError, ApiErrorKind, FabricError, Result};
pub use naming::{application_id, application_name_from_service, service_id};
pub use parameters::NameValueParameter;
pub use partition::{PartitionDescription, PartitionSpec};
pub use service::{
    MoveCost, ServiceDescription, ServiceInfo, ServiceKind, ServicePackageActivationMode,
    ServiceSpec, ServiceUpdateDescription, StatefulSpec, StatelessSpec, UpdateField, update_flag,
};
pub use service_type::{ServiceTypeDescription, ServiceTypeInfo};
pub use upgrade::{
    ApplicationHealthPolicy, ApplicationUpgradeDescription, ApplicationUpgradeProgress,
    RollingUpgradeMode, RollingUpgradeMonitoringPolicy, UpgradeOutcome,
};
