//! Declarative resource semantics
//!
//! Each resource turns a desired configuration into cluster calls and reports
//! the observed state back. `read` returning `None` means the resource no
//! longer exists and should be forgotten.

pub mod application;
pub mod application_type;
pub mod service;

use crate::action::Action;
use crate::error::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use application::{ApplicationConfig, ApplicationResource, ApplicationState};
pub use application_type::{ApplicationTypeConfig, ApplicationTypeResource, ApplicationTypeState};
pub use service::{ServiceConfig, ServiceResource, ServiceState};

/// How a delete request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Already absent on the cluster
    AlreadyGone,
    /// Left in place on purpose
    Retained,
    /// Still referenced by something else; left in place with a warning
    InUse,
}

#[async_trait]
pub trait Resource: Send + Sync {
    type Config: Send + Sync;
    type State: Send + Sync;

    /// Resource type name used in plans and logs
    fn type_name(&self) -> &'static str;

    async fn create(&self, cancel: &CancellationToken, config: &Self::Config) -> Result<Self::State>;

    async fn read(
        &self,
        cancel: &CancellationToken,
        state: &Self::State,
    ) -> Result<Option<Self::State>>;

    /// Describe what `update` would do, without calling the cluster.
    fn plan(&self, prior: &Self::Config, desired: &Self::Config) -> Result<Action>;

    /// Apply an in-place change. Changes that need replacement are rejected
    /// with [`ProviderError::RequiresReplacement`](crate::ProviderError::RequiresReplacement).
    async fn update(
        &self,
        cancel: &CancellationToken,
        prior: &Self::Config,
        desired: &Self::Config,
    ) -> Result<Self::State>;

    async fn delete(&self, cancel: &CancellationToken, state: &Self::State) -> Result<DeleteOutcome>;

    /// Seed a state from an import identifier. Follow with `read`.
    fn import(&self, id: &str) -> Result<Self::State>;
}
