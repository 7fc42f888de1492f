//! Filesystem utilities for the launcher.
//!
//! Trace artifacts and daemon bookkeeping files are written atomically so a
//! concurrent launcher never observes a partial file.

pub mod atomic;

pub use atomic::atomic_write;
pub use atomic::atomic_write_file;
