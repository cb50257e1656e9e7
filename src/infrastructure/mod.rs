//! Adapters implementing the domain ports.

pub mod completion;
pub mod in_memory;
pub mod intasend;
pub mod mysql;
