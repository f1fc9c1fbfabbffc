//! Permission-gated fan-out of VM lifecycle operations to the compute provider.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::clients::{CloudVm, ComputeProvider, ProviderConnector, ProviderError, VmAction};
use crate::domain::{ActionClass, Identity};
use crate::vault::VaultError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    CredentialsMissing(String),

    #[error("Azure error: {0}")]
    Provider(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl From<ProviderError> for DispatchError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::CredentialsMissing(msg) => Self::CredentialsMissing(msg),
            ProviderError::Vault(e) => Self::Vault(e),
            other => Self::Provider(other.to_string()),
        }
    }
}

/// Body of a single VM action. Fields are optional so that missing ones
/// surface as `InvalidInput` instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmActionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub resource_group: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

/// One target of a bulk action.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmTarget {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub resource_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmActionResult {
    pub name: String,
    pub resource_group: String,
    pub location: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VmActionResult {
    fn failed(name: String, resource_group: String, err: &DispatchError) -> Self {
        let message = err.to_string();
        Self {
            name,
            resource_group,
            location: None,
            status: format!("Error: {message}"),
            error: Some(message),
        }
    }
}

pub struct CloudDispatcher {
    connector: Arc<dyn ProviderConnector>,
    operation_timeout: Duration,
}

impl CloudDispatcher {
    #[must_use]
    pub fn new(connector: Arc<dyn ProviderConnector>, operation_timeout: Duration) -> Self {
        Self {
            connector,
            operation_timeout,
        }
    }

    /// Live VMs in provider order.
    pub async fn list_vms(&self, identity: &Identity) -> Result<Vec<CloudVm>, DispatchError> {
        authorize(identity, ActionClass::ListVms)?;

        let provider = self.connector.connect().await?;
        let vms = tokio::time::timeout(self.operation_timeout, provider.list_all())
            .await
            .map_err(|_| DispatchError::Timeout(self.operation_timeout))??;

        Ok(vms)
    }

    /// Runs one lifecycle action and reports the resulting status.
    ///
    /// The permission check precedes all input validation.
    pub async fn act(
        &self,
        identity: &Identity,
        request: VmActionRequest,
    ) -> Result<VmActionResult, DispatchError> {
        authorize(identity, ActionClass::VmLifecycle)?;

        let (resource_group, name) = validate_target(request.name, request.resource_group)?;
        let action = parse_action(request.action.as_deref())?;

        let provider = self.connector.connect().await?;
        info!(
            user = %identity.username,
            vm = %name,
            resource_group = %resource_group,
            action = %action,
            "VM action requested"
        );

        execute(provider, action, resource_group, name, self.operation_timeout).await
    }

    /// Runs `action` on every target concurrently.
    ///
    /// Per-target failures are reported inline; the result order matches
    /// `targets`.
    pub async fn bulk_act(
        &self,
        identity: &Identity,
        targets: Vec<VmTarget>,
        action: Option<&str>,
    ) -> Result<Vec<VmActionResult>, DispatchError> {
        authorize(identity, ActionClass::VmLifecycle)?;

        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let provider = self.connector.connect().await?;
        let action = parse_action(action).map_err(|e| e.to_string());

        info!(
            user = %identity.username,
            targets = targets.len(),
            action = action.as_ref().map_or("invalid", VmAction::as_str),
            "Bulk VM action requested"
        );

        let mut labels = Vec::with_capacity(targets.len());
        let mut handles = Vec::with_capacity(targets.len());

        for target in targets {
            labels.push((
                target.name.clone().unwrap_or_default(),
                target.resource_group.clone().unwrap_or_default(),
            ));

            let provider = provider.clone();
            let action = action.clone();
            let timeout = self.operation_timeout;

            handles.push(tokio::spawn(async move {
                let (resource_group, name) = validate_target(target.name, target.resource_group)?;
                let action = action.map_err(DispatchError::InvalidInput)?;
                execute(provider, action, resource_group, name, timeout).await
            }));
        }

        let results = join_all(handles)
            .await
            .into_iter()
            .zip(labels)
            .map(|(joined, (name, resource_group))| {
                let outcome = joined.unwrap_or_else(|e| {
                    Err(DispatchError::Provider(format!("task failed: {e}")))
                });
                outcome.unwrap_or_else(|err| {
                    warn!(vm = %name, error = %err, "Bulk action target failed");
                    VmActionResult::failed(name, resource_group, &err)
                })
            })
            .collect();

        Ok(results)
    }
}

/// Permission gate shared by every dispatcher entry point.
pub fn authorize(identity: &Identity, action: ActionClass) -> Result<(), DispatchError> {
    if identity.can(action) {
        Ok(())
    } else {
        Err(DispatchError::Forbidden(format!(
            "{} permission cannot perform this action",
            identity.permission
        )))
    }
}

/// Returns `(resource_group, name)`.
fn validate_target(
    name: Option<String>,
    resource_group: Option<String>,
) -> Result<(String, String), DispatchError> {
    let name = name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| DispatchError::InvalidInput("VM name is required".to_string()))?;
    let resource_group = resource_group
        .filter(|rg| !rg.trim().is_empty())
        .ok_or_else(|| DispatchError::InvalidInput("resourceGroup is required".to_string()))?;

    ensure_plain_segment("VM name", &name)?;
    ensure_plain_segment("resourceGroup", &resource_group)?;

    Ok((resource_group, name))
}

/// Names end up as single ARM path segments.
fn ensure_plain_segment(field: &str, value: &str) -> Result<(), DispatchError> {
    let reserved = value.contains(['/', '\\', '?', '#', '%']);
    if reserved || value == "." || value == ".." {
        return Err(DispatchError::InvalidInput(format!(
            "{field} contains invalid characters"
        )));
    }
    Ok(())
}

fn parse_action(action: Option<&str>) -> Result<VmAction, DispatchError> {
    let raw = action.ok_or_else(|| DispatchError::InvalidInput("action is required".to_string()))?;

    raw.parse::<VmAction>().map_err(|_| {
        DispatchError::InvalidInput(format!(
            "Invalid action '{raw}'. Expected one of: start, deallocate, poweroff, restart"
        ))
    })
}

async fn execute(
    provider: Arc<dyn ComputeProvider>,
    action: VmAction,
    resource_group: String,
    name: String,
    timeout: Duration,
) -> Result<VmActionResult, DispatchError> {
    let operation = async {
        provider.perform(action, &resource_group, &name).await?;
        provider.instance_view(&resource_group, &name).await
    };

    let outcome = match tokio::time::timeout(timeout, operation).await {
        Ok(Ok(view)) => Ok(view),
        Ok(Err(e)) => Err(DispatchError::from(e)),
        Err(_) => Err(DispatchError::Timeout(timeout)),
    };

    let label = if outcome.is_ok() { "success" } else { "error" };
    metrics::counter!("vm_actions_total", "action" => action.as_str(), "outcome" => label)
        .increment(1);

    let view = outcome?;
    info!(vm = %name, action = %action, status = %view.status, "VM action completed");

    Ok(VmActionResult {
        name,
        resource_group,
        location: Some(view.location),
        status: view.status,
        error: None,
    })
}
