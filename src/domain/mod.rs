//! Domain layer - Remote records and port definitions
//!
//! This module defines the core traits (ports) that collaborators implement,
//! following hexagonal architecture principles.

pub mod ports;

pub use ports::*;
