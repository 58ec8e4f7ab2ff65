//! Exchange Web Services backend.
//!
//! Speaks SOAP over HTTPS with Basic authentication against a fixed service
//! endpoint (no autodiscover). Listing uses a `CalendarView` so recurring
//! series arrive as individual occurrences; writes never send invitations.

mod backend;
mod client;
mod config;
mod soap;

pub use backend::EwsBackend;
pub use config::{EwsConfig, EwsSettings};
