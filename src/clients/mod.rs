pub mod azure;
pub mod compute;
pub mod mock;

pub use azure::{AzureClient, AzureConnector};
pub use compute::{
    CloudVm, ComputeProvider, FixedConnector, InstanceView, ProviderConnector, ProviderError,
    VmAction,
};
pub use mock::MockCompute;
