//! Client services.
//!
//! ARCHITECTURE
//! ============
//! `session` owns auth state per realm and `refresh` keeps its token alive.
//! `chat` and `profile` read and write remote rows through the shared query
//! cache. `admin_guard` gates back-office routes on the admin session, and
//! `consent` persists the cookie-consent choice.

pub mod admin_guard;
pub mod chat;
pub mod consent;
pub mod profile;
pub mod refresh;
pub mod session;
