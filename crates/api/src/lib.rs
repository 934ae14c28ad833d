//! `gatehouse-api` — HTTP surface for the admin back-office.
//!
//! Thin consumer of the authenticator: routes read its snapshot to decide
//! what to serve and call `login`/`logout` to change it.

pub mod app;
pub mod guard;
