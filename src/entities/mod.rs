pub mod prelude;

pub mod groups;
pub mod tags;
pub mod user_groups;
pub mod users;
pub mod vm_tags;
pub mod vms;
