//! Scheduled serverless function that writes a shared drive's folder map.
//!
//! The entry point in `main.rs` wires configuration, ambient credentials and
//! the job into [`handler::function_handler`]; everything below it is
//! stateless per invocation.

pub mod config;
pub mod credentials;
pub mod drive;
pub mod folder_map;
pub mod handler;
pub mod job;
