// haven core - the shared library under the personal-safety app shells.
//
// The platform shells implement the capture/alert traits in `capture`,
// construct the orchestrator in `emergency`, and link this crate as a
// static/dynamic library. Everything below the UI lives here.

pub mod auth;
pub mod capture;
pub mod crypto;
pub mod emergency;
pub mod notify;
pub mod paths;
pub mod session;
pub mod settings;
pub mod status;
pub mod store;

// Re-export log macros for use throughout the crate
pub use log::{debug, error, info, trace, warn};
