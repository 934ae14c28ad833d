//! `gatehouse-auth` — session/role-gated authentication for the admin area.
//!
//! This crate decides whether the current provider session belongs to a
//! privileged principal and exposes that decision as observable state. It is
//! intentionally decoupled from HTTP and from any concrete backend: callers
//! inject an [`IdentityProvider`] and a [`RoleStore`] and read state through
//! a watch channel.

pub mod authenticator;
pub mod error;
pub mod principal;
pub mod provider;
pub mod state;

pub use authenticator::AuthCore;
pub use error::AuthError;
pub use principal::Principal;
pub use provider::{IdentityProvider, RoleStore};
pub use state::{AuthEvent, AuthPhase, AuthSnapshot, transition};
