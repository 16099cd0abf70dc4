//! CLI command implementations

pub mod cache;
pub mod completions;
pub mod config;
pub mod install;

pub use cache::execute as cache;
pub use completions::execute as completions;
pub use config::execute as config;
pub use install::execute as install;
