//! CLI command modules.

pub mod http;
pub mod messages;
pub mod peers;
pub mod status;
