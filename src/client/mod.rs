//! Registry Clients
//!
//! Implementations of [`crate::domain::ports::RegistryClient`]. The crate
//! ships the standalone in-memory service center; remote transports are
//! supplied by integrations through a [`crate::registry::ComponentFactory`].

pub mod local;

pub use local::*;
