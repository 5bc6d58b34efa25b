//! Registry Module
//!
//! The coordinator, the local microservice set, the consistency state
//! machine and the event bus connecting them to the registration task.

pub mod consistency;
pub mod coordinator;
pub mod events;
pub mod factory;
pub mod manager;
pub mod microservice;

pub use consistency::*;
pub use coordinator::*;
pub use events::*;
pub use factory::*;
pub use manager::*;
pub use microservice::*;
