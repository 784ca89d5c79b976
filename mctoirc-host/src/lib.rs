//! Native-library face of the relay for game servers that load it over FFI.
//!
//! The host creates a bridge from a config file path, registers one
//! callback for channel broadcasts, and reports game events through the
//! `mctoirc_emit_*` functions. Every bridge shares one tokio runtime owned
//! by this library.

pub mod bridge;
pub mod core;
pub mod error;

use once_cell::sync::Lazy;

/// Runtime shared by every bridge handle. IRC traffic for a handful of
/// sessions needs very little, so it is kept small.
pub(crate) static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("mctoirc")
        .build()
        .expect("Failed to create tokio runtime")
});
