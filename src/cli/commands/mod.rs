mod seed;
mod user;

pub use seed::{cmd_seed_users, cmd_unseed_users};
pub use user::{cmd_user_create, cmd_user_delete, cmd_user_list, cmd_user_set_permission};
