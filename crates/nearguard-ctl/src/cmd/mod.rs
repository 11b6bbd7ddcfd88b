//! CLI command modules.

pub mod blocklist;
pub mod filter;
pub mod http;
pub mod messages;
pub mod peers;
pub mod permission;
pub mod status;
