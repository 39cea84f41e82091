//! InfraJet client core.
//!
//! Session management for the end-user and back-office realms, a token
//! auto-refresh loop, a query-key-addressed remote data cache with write-through
//! mutations, the admin route guard, and the static file server that ships the
//! compiled client bundle.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod models;
pub mod notify;
pub mod routes;
pub mod services;
pub mod store;
