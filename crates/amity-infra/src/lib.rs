//! Infrastructure adapters for the Amity messaging core.
//!
//! Implements the ports defined in `amity-core`: encrypted SQLite message
//! persistence, the per-message cipher codec, the HTTP client for the
//! generative coaching backend, and configuration loading.

pub mod backend;
pub mod config;
pub mod crypto;
pub mod sqlite;
