//! CLI subcommand implementations.

pub mod fetch;
pub mod query;
pub mod report;
pub mod util;
pub mod watch;
