pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService, Registration, UserInfo};
pub use auth_service_impl::SeaOrmAuthService;

pub mod identity;
pub use identity::{IdentityResolver, SESSION_USER_KEY};

pub mod inventory_service;
pub mod inventory_service_impl;
pub use inventory_service::{
    AccountUpdate, InventoryError, InventoryService, NamedRecord, NewAccount,
};
pub use inventory_service_impl::SeaOrmInventoryService;

pub mod dispatcher;
pub use dispatcher::{
    CloudDispatcher, DispatchError, VmActionRequest, VmActionResult, VmTarget, authorize,
};
