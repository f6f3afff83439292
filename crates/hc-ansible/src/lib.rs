//! Ansible modules for Hetzner Cloud.
//!
//! Each module is a binary under `src/bin` that reads its arguments file,
//! converges the requested resources and prints one JSON result.

pub mod args;
pub mod error;
pub mod floating_ip;
pub mod inventory;
pub mod module;
pub mod server;
pub mod ssh_key;
pub mod version;

pub use error::{ModuleError, Result};
