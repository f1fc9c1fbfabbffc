pub use super::groups::Entity as Groups;
pub use super::tags::Entity as Tags;
pub use super::user_groups::Entity as UserGroups;
pub use super::users::Entity as Users;
pub use super::vm_tags::Entity as VmTags;
pub use super::vms::Entity as Vms;
