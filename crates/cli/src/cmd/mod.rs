mod cache;
mod info;
mod module;

pub use cache::{CacheArgs, cmd_cache};
pub use info::cmd_info;
pub use module::{ModuleArgs, cmd_module};
