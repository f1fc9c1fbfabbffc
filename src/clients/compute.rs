//! Provider-neutral view of a compute API.
//!
//! The dispatcher only talks to [`ComputeProvider`] and obtains one through a
//! [`ProviderConnector`], so the real Azure client and the in-process mock are
//! interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::vault::VaultError;

/// A live virtual machine as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudVm {
    pub id: String,
    pub name: String,
    pub location: String,
    #[serde(rename = "type")]
    pub vm_type: String,
    pub resource_group: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceView {
    pub status: String,
    pub location: String,
}

/// Lifecycle operations accepted by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmAction {
    Start,
    Deallocate,
    #[serde(rename = "poweroff")]
    PowerOff,
    Restart,
}

impl VmAction {
    pub const ALL: [Self; 4] = [Self::Start, Self::Deallocate, Self::PowerOff, Self::Restart];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Deallocate => "deallocate",
            Self::PowerOff => "poweroff",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for VmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VmAction {
    type Err = String;

    /// Matching is exact; `Start` or `power_off` are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("Invalid action '{s}'"))
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0}")]
    CredentialsMissing(String),

    #[error("Authentication with provider failed: {0}")]
    Auth(String),

    /// Non-success answer from the provider API, carrying its message.
    #[error("{0}")]
    Api(String),

    #[error("Operation did not succeed: {0}")]
    OperationFailed(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Every VM in the subscription, in the order the provider returns them.
    async fn list_all(&self) -> Result<Vec<CloudVm>, ProviderError>;

    async fn instance_view(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<InstanceView, ProviderError>;

    async fn start(&self, resource_group: &str, name: &str) -> Result<(), ProviderError>;

    async fn power_off(&self, resource_group: &str, name: &str) -> Result<(), ProviderError>;

    async fn deallocate(&self, resource_group: &str, name: &str) -> Result<(), ProviderError>;

    async fn restart(&self, resource_group: &str, name: &str) -> Result<(), ProviderError>;

    /// Runs `action` and waits for the provider to report completion.
    async fn perform(
        &self,
        action: VmAction,
        resource_group: &str,
        name: &str,
    ) -> Result<(), ProviderError> {
        match action {
            VmAction::Start => self.start(resource_group, name).await,
            VmAction::PowerOff => self.power_off(resource_group, name).await,
            VmAction::Deallocate => self.deallocate(resource_group, name).await,
            VmAction::Restart => self.restart(resource_group, name).await,
        }
    }
}

/// Yields a ready-to-use provider, loading credentials as needed.
#[async_trait]
pub trait ProviderConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ComputeProvider>, ProviderError>;
}

/// Always hands out the same provider. Used for mock mode and tests.
pub struct FixedConnector {
    provider: Arc<dyn ComputeProvider>,
}

impl FixedConnector {
    #[must_use]
    pub fn new(provider: Arc<dyn ComputeProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ProviderConnector for FixedConnector {
    async fn connect(&self) -> Result<Arc<dyn ComputeProvider>, ProviderError> {
        Ok(self.provider.clone())
    }
}
