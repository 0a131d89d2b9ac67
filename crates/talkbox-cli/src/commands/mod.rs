//! CLI command implementations.

pub(crate) mod config;
pub(crate) mod history;
pub(crate) mod send;
pub(crate) mod tail;
