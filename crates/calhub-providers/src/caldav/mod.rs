//! CalDAV backend.
//!
//! Talks WebDAV/CalDAV (RFC 4791) to one calendar collection:
//!
//! - HTTP Digest and Basic authentication, answered on the first challenge
//! - PROPFIND discovery when the account names a calendar by display name
//! - REPORT `calendar-query` with server-side recurrence expansion
//! - conditional PUT/DELETE guarded by ETags

mod auth;
mod backend;
mod client;
mod config;
mod ics;
mod xml;

pub use backend::CalDavBackend;
pub use config::{CalDavConfig, CalDavSettings};
