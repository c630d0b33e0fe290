//! CLI command implementations.

pub mod decode;
pub mod fetch;
pub mod send;
pub mod watch;
