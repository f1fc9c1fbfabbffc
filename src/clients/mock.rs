//! Deterministic stand-in for the compute API, enabled by `azure.mock_mode`.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::compute::{CloudVm, ComputeProvider, InstanceView, ProviderError, VmAction};

pub const MOCK_LOCATION: &str = "mock-loc";
pub const MOCK_RESOURCE_GROUP: &str = "mock-group";

const SEED: [(&str, &str); 2] = [("mock-vm1", "VM running"), ("mock-vm2", "VM deallocated")];

/// Names outside `SEED` whose last status is remembered; oldest go first.
const MAX_UNSEEDED_STATUSES: usize = 64;

#[derive(Default)]
struct StatusBook {
    by_name: HashMap<String, String>,
    unseeded: VecDeque<String>,
}

impl StatusBook {
    fn record(&mut self, name: &str, status: String) {
        let seeded = SEED.iter().any(|(seed, _)| *seed == name);
        if !seeded && !self.by_name.contains_key(name) {
            if self.unseeded.len() >= MAX_UNSEEDED_STATUSES
                && let Some(oldest) = self.unseeded.pop_front()
            {
                self.by_name.remove(&oldest);
            }
            self.unseeded.push_back(name.to_string());
        }
        self.by_name.insert(name.to_string(), status);
    }

    fn get(&self, name: &str) -> Option<&String> {
        self.by_name.get(name)
    }
}

#[derive(Default)]
pub struct MockCompute {
    /// Status after the most recent action, by VM name.
    statuses: RwLock<StatusBook>,
    failures: HashMap<String, String>,
    delay: Option<Duration>,
}

impl MockCompute {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call touching `name` fails with `message`.
    #[must_use]
    pub fn with_failure(mut self, name: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(name.into(), message.into());
        self
    }

    /// Lifecycle calls sleep for `delay` before completing.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn check_failure(&self, name: &str) -> Result<(), ProviderError> {
        match self.failures.get(name) {
            Some(message) => Err(ProviderError::Api(message.clone())),
            None => Ok(()),
        }
    }

    async fn apply(&self, action: VmAction, name: &str) -> Result<(), ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failure(name)?;

        debug!(vm = %name, action = %action, "Mock lifecycle call");
        self.statuses
            .write()
            .await
            .record(name, format!("[MOCK] {action}"));
        Ok(())
    }
}

#[async_trait]
impl ComputeProvider for MockCompute {
    async fn list_all(&self) -> Result<Vec<CloudVm>, ProviderError> {
        let statuses = self.statuses.read().await;

        Ok(SEED
            .iter()
            .map(|(name, default_status)| CloudVm {
                id: format!(
                    "/subscriptions/mock/resourceGroups/{MOCK_RESOURCE_GROUP}/providers/Microsoft.Compute/virtualMachines/{name}"
                ),
                name: (*name).to_string(),
                location: MOCK_LOCATION.to_string(),
                vm_type: "Microsoft.Compute/virtualMachines".to_string(),
                resource_group: MOCK_RESOURCE_GROUP.to_string(),
                status: statuses
                    .get(*name)
                    .cloned()
                    .unwrap_or_else(|| (*default_status).to_string()),
            })
            .collect())
    }

    async fn instance_view(
        &self,
        _resource_group: &str,
        name: &str,
    ) -> Result<InstanceView, ProviderError> {
        self.check_failure(name)?;

        let status = self
            .statuses
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_else(|| "VM running".to_string());

        Ok(InstanceView {
            status,
            location: MOCK_LOCATION.to_string(),
        })
    }

    async fn start(&self, _resource_group: &str, name: &str) -> Result<(), ProviderError> {
        self.apply(VmAction::Start, name).await
    }

    async fn power_off(&self, _resource_group: &str, name: &str) -> Result<(), ProviderError> {
        self.apply(VmAction::PowerOff, name).await
    }

    async fn deallocate(&self, _resource_group: &str, name: &str) -> Result<(), ProviderError> {
        self.apply(VmAction::Deallocate, name).await
    }

    async fn restart(&self, _resource_group: &str, name: &str) -> Result<(), ProviderError> {
        self.apply(VmAction::Restart, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listing_is_fixed() {
        let mock = MockCompute::new();
        let vms = mock.list_all().await.unwrap();

        let names: Vec<&str> = vms.iter().map(|vm| vm.name.as_str()).collect();
        assert_eq!(names, vec!["mock-vm1", "mock-vm2"]);
        assert!(vms.iter().all(|vm| vm.resource_group == MOCK_RESOURCE_GROUP));
    }

    #[tokio::test]
    async fn test_action_is_reflected_in_status() {
        let mock = MockCompute::new();
        mock.perform(VmAction::PowerOff, "mock-group", "mock-vm1")
            .await
            .unwrap();

        let view = mock.instance_view("mock-group", "mock-vm1").await.unwrap();
        assert_eq!(view.status, "[MOCK] poweroff");
        assert_eq!(view.location, MOCK_LOCATION);

        let listed = mock.list_all().await.unwrap();
        assert_eq!(listed[0].status, "[MOCK] poweroff");
        assert_eq!(listed[1].status, "VM deallocated");
    }

    #[tokio::test]
    async fn test_unseeded_statuses_are_bounded() {
        let mock = MockCompute::new();
        mock.start("mock-group", "mock-vm1").await.unwrap();

        let extra = MAX_UNSEEDED_STATUSES + 10;
        for i in 0..extra {
            mock.restart("rg", &format!("adhoc-{i}")).await.unwrap();
        }

        let book = mock.statuses.read().await;
        assert_eq!(book.by_name.len(), MAX_UNSEEDED_STATUSES + 1);
        assert_eq!(book.unseeded.len(), MAX_UNSEEDED_STATUSES);
        assert_eq!(book.get("mock-vm1").map(String::as_str), Some("[MOCK] start"));
        assert!(book.get("adhoc-0").is_none());
        drop(book);

        let newest = format!("adhoc-{}", extra - 1);
        let view = mock.instance_view("rg", &newest).await.unwrap();
        assert_eq!(view.status, "[MOCK] restart");
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let mock = MockCompute::new().with_failure("broken", "VM not found");
        let err = mock.start("rg", "broken").await.unwrap_err();
        assert_eq!(err.to_string(), "VM not found");
    }
}
