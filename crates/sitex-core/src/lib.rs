//! Foundational low-level utilities shared across the site extension crates.
//!
//! Provides the atomic file-replace helper used by the operation record store
//! and timestamp helpers used for logging and bookkeeping.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
