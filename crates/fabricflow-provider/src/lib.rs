//! FabricFlow provider
//!
//! Declarative resources on top of [`fabricflow_client`]: application types,
//! applications and services, plus read-only data lookups.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              IaC host (plan / apply)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │              fabricflow-provider                 │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │ProviderConfig│  │ trait Resource { ... }    │ │
//! │  └──────────────┘  └──────────────────────────┘ │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │ DataSources  │  │ Plan / Action             │ │
//! │  └──────────────┘  └──────────────────────────┘ │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │   fabricflow-client (REST + operation polling)   │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod config;
pub mod data;
pub mod error;
pub mod resources;
pub mod telemetry;

// Re-exports
pub use action::{Action, ActionType, Plan, PlanSummary};
pub use config::{AuthType, ProviderConfig, ProviderFeatures};
pub use data::DataSources;
pub use error::{ProviderError, Result};
pub use resources::{
    ApplicationConfig, ApplicationResource, ApplicationState, ApplicationTypeConfig,
    ApplicationTypeResource, ApplicationTypeState, DeleteOutcome, Resource, ServiceConfig,
    ServiceResource, ServiceState,
};
pub use telemetry::init_tracing;

use fabricflow_client::{FabricClient, TokenSource};
use std::sync::Arc;

/// Configured provider handing out resources that share one client.
#[derive(Debug, Clone)]
pub struct FabricProvider {
    client: FabricClient,
    features: ProviderFeatures,
}

impl FabricProvider {
    pub fn new(config: &ProviderConfig, token_source: Option<Arc<dyn TokenSource>>) -> Result<Self> {
        let client = config.build_client(token_source)?;
        tracing::info!(endpoint = %config.endpoint, "provider configured");
        Ok(Self::with_client(client, config.features.clone()))
    }

    pub fn from_env(token_source: Option<Arc<dyn TokenSource>>) -> Result<Self> {
        Self::new(&ProviderConfig::from_env()?, token_source)
    }

    /// Wrap an already built client.
    pub fn with_client(client: FabricClient, features: ProviderFeatures) -> Self {
        Self { client, features }
    }

    pub fn client(&self) -> &FabricClient {
        &self.client
    }

    pub fn application_types(&self) -> ApplicationTypeResource {
        ApplicationTypeResource::new(self.client.clone())
    }

    pub fn applications(&self) -> ApplicationResource {
        ApplicationResource::new(self.client.clone(), self.features.clone())
    }

    pub fn services(&self) -> ServiceResource {
        ServiceResource::new(self.client.clone())
    }

    pub fn data(&self) -> DataSources {
        DataSources::new(self.client.clone())
    }
}
