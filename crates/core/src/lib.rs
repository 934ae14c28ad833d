//! `gatehouse-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared across the
//! workspace (no infrastructure concerns, no IO, no async).

pub mod error;
pub mod id;
pub mod record;
pub mod role;
pub mod session;

pub use error::{ProviderError, StorageError};
pub use id::UserId;
pub use record::RoleRecord;
pub use role::Role;
pub use session::{Session, SessionChange, SessionEventKind};
