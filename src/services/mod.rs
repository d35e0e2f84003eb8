pub mod instance_guard;
pub mod keep_alive;

pub use instance_guard::{is_duplicate, InstanceGuard};
pub use keep_alive::{create_keep_alive, KeepAliveService, KeepAliveStats, SharedKeepAlive};
