//! Command implementations
//!
//! The interactive send flow lives here; `main` only wires the session and
//! the transport around it.

pub mod send_file;

pub use send_file::{run as send_file_run, RunOutcome};
