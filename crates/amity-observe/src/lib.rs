//! Tracing subscriber initialization for Amity.

pub mod tracing_setup;

pub use tracing_setup::init_tracing;
