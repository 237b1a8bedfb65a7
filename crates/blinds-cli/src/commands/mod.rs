//! Command implementations.

mod config;
mod list;
mod set;
mod watch;

pub use config::cmd_config;
pub use list::cmd_list;
pub use set::cmd_set;
pub use watch::cmd_watch;
