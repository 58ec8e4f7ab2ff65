//! CalendarBackend contract and provider adapters.
//!
//! Every calendar provider implements the five-operation
//! [`CalendarBackend`] trait. Events leave a backend as
//! [`CalendarEvent`](calhub_core::CalendarEvent)s in naive local time.
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ CalDAV server│  │ Google API   │  │ Exchange EWS │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        ▼                 ▼                 ▼
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ CalDavBackend│  │ GoogleBackend│  │  EwsBackend  │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        └───────── CalendarBackend ─────────┘
//!                          │
//!                          ▼
//!                   CalendarEvent
//! ```
//!
//! Adapters are behind the `caldav`, `google` and `ews` features (all on by
//! default).

pub mod backend;
#[cfg(feature = "caldav")]
pub mod caldav;
pub mod credentials;
pub mod error;
#[cfg(feature = "ews")]
pub mod ews;
#[cfg(feature = "google")]
pub mod google;
#[cfg(any(feature = "caldav", feature = "ews"))]
mod xml;

pub use backend::{
    BackendKind, BoxFuture, CalendarBackend, ErrorBackend, EventPatch, NewEvent,
    UnknownBackendKind,
};
pub use credentials::EnvCredentials;
pub use error::{BackendError, BackendErrorCode, BackendResult};
