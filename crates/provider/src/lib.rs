//! `gatehouse-provider` — identity/role backend implementations.
//!
//! Two backends implement the traits from `gatehouse-auth`: an in-memory
//! one for development and tests (with failure/latency injection) and a
//! REST one speaking the hosted backend's HTTP API.

pub mod memory;
pub mod rest;

pub use memory::MemoryBackend;
pub use rest::{RestBackend, RestConfig};
