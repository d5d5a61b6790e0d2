//! Binding to `libvncserver`, the external RFB server library (spec.md §1
//! scopes wire handling out of the core; `original_source` identifies which
//! library the core links against).

pub mod server;
pub mod sys;

pub use server::{FdReady, RfbServer};
