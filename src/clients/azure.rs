//! Azure Resource Manager client for `Microsoft.Compute/virtualMachines`.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, Response, StatusCode, header};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use super::compute::{
    CloudVm, ComputeProvider, InstanceView, ProviderConnector, ProviderError,
};
use crate::config::AzureConfig;
use crate::vault::{CredentialVault, ProviderCredential};

/// Refresh the token this long before Azure says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(120);

const UNKNOWN_STATUS: &str = "Unknown";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct VmListPage {
    #[serde(default)]
    value: Vec<VmResource>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VmResource {
    id: String,
    name: String,
    location: String,
    #[serde(rename = "type")]
    resource_type: String,
}

#[derive(Debug, Deserialize)]
struct VmWithInstanceView {
    location: String,
    #[serde(default)]
    properties: VmProperties,
}

#[derive(Debug, Default, Deserialize)]
struct VmProperties {
    #[serde(rename = "instanceView", default)]
    instance_view: InstanceViewBody,
}

#[derive(Debug, Default, Deserialize)]
struct InstanceViewBody {
    #[serde(default)]
    statuses: Vec<InstanceViewStatus>,
}

#[derive(Debug, Deserialize)]
struct InstanceViewStatus {
    code: String,
    #[serde(rename = "displayStatus")]
    display_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AsyncOperationBody {
    status: Option<String>,
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

impl ErrorDetail {
    fn describe(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

/// Extract the resource group segment from an ARM resource id.
#[must_use]
pub fn resource_group_from_id(id: &str) -> Option<String> {
    let mut segments = id.split('/');
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("resourceGroups") {
            return segments
                .next()
                .filter(|rg| !rg.is_empty())
                .map(str::to_string);
        }
    }
    None
}

/// The `displayStatus` of the `PowerState/*` entry, if any.
fn power_state(statuses: &[InstanceViewStatus]) -> Option<String> {
    statuses
        .iter()
        .find(|s| s.code.starts_with("PowerState/"))
        .map(|s| {
            s.display_status
                .clone()
                .unwrap_or_else(|| s.code.trim_start_matches("PowerState/").to_string())
        })
}

pub struct AzureClient {
    http: Client,
    credential: ProviderCredential,
    subscription_id: String,
    management_endpoint: String,
    login_endpoint: String,
    api_version: String,
    poll_interval: Duration,
    token: RwLock<Option<CachedToken>>,
}

impl AzureClient {
    #[must_use]
    pub fn new(http: Client, credential: ProviderCredential, config: &AzureConfig) -> Self {
        Self {
            http,
            credential,
            subscription_id: config.subscription_id.clone(),
            management_endpoint: config.management_endpoint.trim_end_matches('/').to_string(),
            login_endpoint: config.login_endpoint.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_seconds.max(1)),
            token: RwLock::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.token.read().await.as_ref()
            && token.expires_at > Instant::now()
        {
            return Ok(token.value.clone());
        }

        let mut slot = self.token.write().await;
        if let Some(token) = slot.as_ref()
            && token.expires_at > Instant::now()
        {
            return Ok(token.value.clone());
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_endpoint, self.credential.tenant_id
        );
        let scope = format!("{}/.default", self.management_endpoint);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credential.client_id.as_str()),
            ("client_secret", self.credential.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self.http.post(&url).form(&params).send().await?;
        if !response.status().is_success() {
            let message = error_message(response).await;
            return Err(ProviderError::Auth(message));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Auth(format!("Invalid token response: {e}")))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        debug!(expires_in = token.expires_in, "Obtained Azure access token");

        *slot = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }

    /// Builds an ARM URL from raw path segments.
    ///
    /// Each segment is percent-encoded on its own, so a `/`, `?` or `#` in a
    /// caller-supplied name cannot change the path or the query.
    fn arm_url(&self, segments: &[&str], query: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.management_endpoint)
            .map_err(|e| ProviderError::Api(format!("Invalid management endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ProviderError::Api("Invalid management endpoint".to_string()))?
            .pop_if_empty()
            .extend(segments);
        url.set_query(Some(query));
        Ok(url)
    }

    fn vm_url(
        &self,
        resource_group: &str,
        name: &str,
        verb: Option<&str>,
        query: &str,
    ) -> Result<Url, ProviderError> {
        let mut segments = vec![
            "subscriptions",
            self.subscription_id.as_str(),
            "resourceGroups",
            resource_group,
            "providers",
            "Microsoft.Compute",
            "virtualMachines",
            name,
        ];
        segments.extend(verb);
        self.arm_url(&segments, query)
    }

    async fn get(&self, url: &str) -> Result<Response, ProviderError> {
        let token = self.access_token().await?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        ensure_success(response).await
    }

    /// POST a lifecycle verb and wait for the long-running operation to finish.
    async fn lifecycle(
        &self,
        resource_group: &str,
        name: &str,
        verb: &str,
    ) -> Result<(), ProviderError> {
        let url = self.vm_url(
            resource_group,
            name,
            Some(verb),
            &format!("api-version={}", self.api_version),
        )?;
        let token = self.access_token().await?;

        info!(vm = %name, resource_group = %resource_group, verb = %verb, "Azure lifecycle request");

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(header::CONTENT_LENGTH, "0")
            .send()
            .await?;
        let response = ensure_success(response).await?;

        if response.status() != StatusCode::ACCEPTED {
            return Ok(());
        }

        let Some(poll_url) = operation_url(&response) else {
            debug!(vm = %name, "Accepted without an operation URL");
            return Ok(());
        };

        self.poll_until_done(&poll_url).await
    }

    async fn poll_until_done(&self, poll_url: &str) -> Result<(), ProviderError> {
        loop {
            tokio::time::sleep(self.poll_interval).await;

            let response = self.get(poll_url).await?;
            if response.status() == StatusCode::ACCEPTED {
                continue;
            }

            let body = response.text().await?;
            if body.trim().is_empty() {
                return Ok(());
            }

            let Ok(operation) = serde_json::from_str::<AsyncOperationBody>(&body) else {
                return Ok(());
            };

            match operation.status.as_deref() {
                None | Some("Succeeded") => return Ok(()),
                Some(status @ ("Failed" | "Canceled")) => {
                    let detail = operation
                        .error
                        .map_or_else(|| status.to_string(), |e| e.describe());
                    return Err(ProviderError::OperationFailed(detail));
                }
                Some(other) => debug!(status = %other, "Operation still running"),
            }
        }
    }
}

#[async_trait]
impl ComputeProvider for AzureClient {
    async fn list_all(&self) -> Result<Vec<CloudVm>, ProviderError> {
        let first = self.arm_url(
            &[
                "subscriptions",
                self.subscription_id.as_str(),
                "providers",
                "Microsoft.Compute",
                "virtualMachines",
            ],
            &format!("api-version={}", self.api_version),
        )?;
        let mut next = Some(first.to_string());
        let mut resources = Vec::new();

        while let Some(url) = next {
            let page: VmListPage = self
                .get(&url)
                .await?
                .json()
                .await
                .map_err(|e| ProviderError::Api(format!("Invalid VM list response: {e}")))?;
            resources.extend(page.value);
            next = page.next_link.filter(|link| !link.is_empty());
        }

        let lookups = resources.into_iter().map(|vm| async move {
            let resource_group = resource_group_from_id(&vm.id).unwrap_or_default();
            let status = match self.instance_view(&resource_group, &vm.name).await {
                Ok(view) => view.status,
                Err(e) => {
                    warn!(vm = %vm.name, error = %e, "Failed to fetch instance view");
                    UNKNOWN_STATUS.to_string()
                }
            };

            CloudVm {
                id: vm.id,
                name: vm.name,
                location: vm.location,
                vm_type: vm.resource_type,
                resource_group,
                status,
            }
        });

        Ok(join_all(lookups).await)
    }

    async fn instance_view(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<InstanceView, ProviderError> {
        let url = self.vm_url(
            resource_group,
            name,
            None,
            &format!("$expand=instanceView&api-version={}", self.api_version),
        )?;

        let vm: VmWithInstanceView = self
            .get(url.as_str())
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Api(format!("Invalid instance view response: {e}")))?;

        Ok(InstanceView {
            status: power_state(&vm.properties.instance_view.statuses)
                .unwrap_or_else(|| UNKNOWN_STATUS.to_string()),
            location: vm.location,
        })
    }

    async fn start(&self, resource_group: &str, name: &str) -> Result<(), ProviderError> {
        self.lifecycle(resource_group, name, "start").await
    }

    async fn power_off(&self, resource_group: &str, name: &str) -> Result<(), ProviderError> {
        self.lifecycle(resource_group, name, "powerOff").await
    }

    async fn deallocate(&self, resource_group: &str, name: &str) -> Result<(), ProviderError> {
        self.lifecycle(resource_group, name, "deallocate").await
    }

    async fn restart(&self, resource_group: &str, name: &str) -> Result<(), ProviderError> {
        self.lifecycle(resource_group, name, "restart").await
    }
}

fn operation_url(response: &Response) -> Option<String> {
    ["Azure-AsyncOperation", "Location"]
        .iter()
        .find_map(|name| response.headers().get(*name))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn ensure_success(response: Response) -> Result<Response, ProviderError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ProviderError::Api(error_message(response).await))
    }
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        return envelope.error.describe();
    }

    // AAD token errors use a flat shape.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body)
        && let Some(description) = value.get("error_description").and_then(|v| v.as_str())
    {
        return description.to_string();
    }

    let truncated: String = body.chars().take(500).collect();
    format!("HTTP {status}: {truncated}")
}

/// Builds an [`AzureClient`] from the vault on demand.
///
/// The client (and its token) is reused until the stored credential changes.
pub struct AzureConnector {
    vault: Arc<CredentialVault>,
    config: AzureConfig,
    http: Client,
    cached: Mutex<Option<(String, Arc<AzureClient>)>>,
}

impl AzureConnector {
    pub fn new(vault: Arc<CredentialVault>, config: AzureConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(concat!("CloudValet/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build Azure HTTP client: {e}"))?;

        Ok(Self {
            vault,
            config,
            http,
            cached: Mutex::new(None),
        })
    }
}

#[async_trait]
impl ProviderConnector for AzureConnector {
    async fn connect(&self) -> Result<Arc<dyn ComputeProvider>, ProviderError> {
        if self.config.subscription_id.is_empty() {
            return Err(ProviderError::CredentialsMissing(
                "AZURE_SUBSCRIPTION_ID is not set".to_string(),
            ));
        }

        let stored = self.vault.load().await?.ok_or_else(|| {
            ProviderError::CredentialsMissing("Azure credentials not set".to_string())
        })?;

        let mut cached = self.cached.lock().await;
        if let Some((version, client)) = cached.as_ref()
            && *version == stored.last_updated
        {
            return Ok(client.clone());
        }

        let client = Arc::new(AzureClient::new(
            self.http.clone(),
            stored.credential,
            &self.config,
        ));
        *cached = Some((stored.last_updated, client.clone()));

        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::extract::State;
    use axum::http::{Method, Uri};
    use axum::response::IntoResponse;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_resource_group_from_id() {
        let id = "/subscriptions/0000/resourceGroups/prod-rg/providers/Microsoft.Compute/virtualMachines/web-01";
        assert_eq!(resource_group_from_id(id), Some("prod-rg".to_string()));

        let lower = "/subscriptions/0000/resourcegroups/Mixed/providers/x/y/z";
        assert_eq!(resource_group_from_id(lower), Some("Mixed".to_string()));

        assert_eq!(resource_group_from_id("/subscriptions/0000"), None);
        assert_eq!(resource_group_from_id(""), None);
    }

    #[test]
    fn test_power_state_picks_power_entry() {
        let body = r#"{
            "location": "westeurope",
            "properties": {
                "instanceView": {
                    "statuses": [
                        {"code": "ProvisioningState/succeeded", "displayStatus": "Provisioning succeeded"},
                        {"code": "PowerState/deallocated", "displayStatus": "VM deallocated"}
                    ]
                }
            }
        }"#;

        let vm: VmWithInstanceView = serde_json::from_str(body).unwrap();
        assert_eq!(vm.location, "westeurope");
        assert_eq!(
            power_state(&vm.properties.instance_view.statuses).as_deref(),
            Some("VM deallocated")
        );
    }

    #[test]
    fn test_power_state_missing() {
        let vm: VmWithInstanceView = serde_json::from_str(r#"{"location": "eastus"}"#).unwrap();
        assert_eq!(power_state(&vm.properties.instance_view.statuses), None);
    }

    #[test]
    fn test_list_page_parsing() {
        let body = r#"{
            "value": [{
                "id": "/subscriptions/s/resourceGroups/rg1/providers/Microsoft.Compute/virtualMachines/vm-a",
                "name": "vm-a",
                "location": "eastus",
                "type": "Microsoft.Compute/virtualMachines"
            }],
            "nextLink": "https://management.azure.com/next"
        }"#;

        let page: VmListPage = serde_json::from_str(body).unwrap();
        assert_eq!(page.value.len(), 1);
        assert_eq!(page.value[0].resource_type, "Microsoft.Compute/virtualMachines");
        assert_eq!(page.next_link.as_deref(), Some("https://management.azure.com/next"));
    }

    #[test]
    fn test_error_detail_describe() {
        let envelope: ErrorEnvelope = serde_json::from_str(
            r#"{"error": {"code": "ResourceNotFound", "message": "VM 'x' was not found"}}"#,
        )
        .unwrap();
        assert_eq!(
            envelope.error.describe(),
            "ResourceNotFound: VM 'x' was not found"
        );
    }

    /// Records every request and answers like a tiny slice of ARM and AAD.
    #[derive(Default)]
    struct StubArm {
        base: String,
        requests: std::sync::Mutex<Vec<String>>,
        token_calls: AtomicUsize,
        polls: AtomicUsize,
    }

    impl StubArm {
        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn stub_handler(
        State(stub): State<Arc<StubArm>>,
        method: Method,
        uri: Uri,
    ) -> axum::response::Response {
        stub.requests.lock().unwrap().push(format!("{method} {uri}"));
        let path = uri.path();

        if path.ends_with("/oauth2/v2.0/token") {
            stub.token_calls.fetch_add(1, Ordering::SeqCst);
            return Json(json!({ "access_token": "stub-token", "expires_in": 3600 }))
                .into_response();
        }

        match path {
            "/operations/slow" => {
                let status = if stub.polls.fetch_add(1, Ordering::SeqCst) == 0 {
                    "InProgress"
                } else {
                    "Succeeded"
                };
                Json(json!({ "status": status })).into_response()
            }
            "/operations/failed" => Json(json!({
                "status": "Failed",
                "error": { "code": "OperationNotAllowed", "message": "Quota exceeded" }
            }))
            .into_response(),
            _ if path.ends_with("/slow-vm/start") => (
                axum::http::StatusCode::ACCEPTED,
                [("Azure-AsyncOperation", format!("{}/operations/slow", stub.base))],
            )
                .into_response(),
            _ if path.ends_with("/failing-vm/start") => (
                axum::http::StatusCode::ACCEPTED,
                [("Location", format!("{}/operations/failed", stub.base))],
            )
                .into_response(),
            _ => axum::http::StatusCode::OK.into_response(),
        }
    }

    async fn spawn_stub() -> (Arc<StubArm>, AzureConfig) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let stub = Arc::new(StubArm {
            base: base.clone(),
            ..StubArm::default()
        });
        let app = axum::Router::new()
            .fallback(stub_handler)
            .with_state(stub.clone());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let config = AzureConfig {
            subscription_id: "sub".to_string(),
            management_endpoint: base.clone(),
            login_endpoint: base,
            ..AzureConfig::default()
        };
        (stub, config)
    }

    fn credential(client_id: &str) -> ProviderCredential {
        ProviderCredential {
            client_id: client_id.to_string(),
            tenant_id: "tenant".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    fn fast_client(config: &AzureConfig) -> AzureClient {
        let mut client = AzureClient::new(Client::new(), credential("client"), config);
        client.poll_interval = Duration::from_millis(10);
        client
    }

    #[tokio::test]
    async fn test_accepted_operation_is_polled_until_succeeded() {
        let (stub, config) = spawn_stub().await;
        let client = fast_client(&config);

        client.start("rg", "slow-vm").await.unwrap();

        assert_eq!(stub.polls.load(Ordering::SeqCst), 2);
        let requests = stub.requests();
        assert!(requests.contains(
            &"POST /subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/slow-vm/start?api-version=2024-07-01"
                .to_string()
        ));
        assert_eq!(
            requests
                .iter()
                .filter(|r| *r == "GET /operations/slow")
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_failed_operation_carries_error_detail() {
        let (_stub, config) = spawn_stub().await;
        let client = fast_client(&config);

        let err = client.start("rg", "failing-vm").await.unwrap_err();

        match err {
            ProviderError::OperationFailed(detail) => {
                assert_eq!(detail, "OperationNotAllowed: Quota exceeded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_token_is_cached_between_calls() {
        let (stub, config) = spawn_stub().await;
        let client = fast_client(&config);

        client.restart("rg", "vm-a").await.unwrap();
        client.deallocate("rg", "vm-b").await.unwrap();

        assert_eq!(stub.token_calls.load(Ordering::SeqCst), 1);
        assert!(
            stub.requests()
                .contains(&"POST /tenant/oauth2/v2.0/token".to_string())
        );
    }

    #[tokio::test]
    async fn test_names_stay_single_path_segments() {
        let (stub, config) = spawn_stub().await;
        let client = fast_client(&config);

        client
            .deallocate(
                "rg",
                "x/../../../../otherRG/providers/Microsoft.Compute/virtualMachines/victim",
            )
            .await
            .unwrap();
        client.start("rg", "vm?evil=1#").await.unwrap();

        let lifecycle: Vec<String> = stub
            .requests()
            .into_iter()
            .filter(|r| r.starts_with("POST /subscriptions"))
            .collect();
        assert_eq!(
            lifecycle,
            vec![
                "POST /subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/x%2F..%2F..%2F..%2F..%2FotherRG%2Fproviders%2FMicrosoft.Compute%2FvirtualMachines%2Fvictim/deallocate?api-version=2024-07-01".to_string(),
                "POST /subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm%3Fevil=1%23/start?api-version=2024-07-01".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_connector_rebuilds_client_after_credential_change() {
        let (stub, config) = spawn_stub().await;
        let dir = std::env::temp_dir().join(format!("cloudvalet-azure-{}", uuid::Uuid::new_v4()));
        let vault = Arc::new(CredentialVault::new(&dir));
        vault.save(&credential("first")).await.unwrap();

        let connector = AzureConnector::new(vault.clone(), config).unwrap();

        let first = connector.connect().await.unwrap();
        let again = connector.connect().await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        first.start("rg", "vm-a").await.unwrap();
        again.start("rg", "vm-a").await.unwrap();
        assert_eq!(stub.token_calls.load(Ordering::SeqCst), 1);

        vault.save(&credential("second")).await.unwrap();
        let rebuilt = connector.connect().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));

        rebuilt.start("rg", "vm-a").await.unwrap();
        assert_eq!(stub.token_calls.load(Ordering::SeqCst), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_connector_requires_credentials() {
        let dir = std::env::temp_dir().join(format!("cloudvalet-azure-{}", uuid::Uuid::new_v4()));
        let vault = Arc::new(CredentialVault::new(&dir));

        let config = AzureConfig {
            subscription_id: "sub".to_string(),
            ..AzureConfig::default()
        };
        let connector = AzureConnector::new(vault, config).unwrap();

        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, ProviderError::CredentialsMissing(_)));
    }

    #[tokio::test]
    async fn test_connector_requires_subscription() {
        let dir = std::env::temp_dir().join(format!("cloudvalet-azure-{}", uuid::Uuid::new_v4()));
        let vault = Arc::new(CredentialVault::new(&dir));
        let connector = AzureConnector::new(vault, AzureConfig::default()).unwrap();

        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, ProviderError::CredentialsMissing(_)));
    }
}
