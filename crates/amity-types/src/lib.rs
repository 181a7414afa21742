//! Shared domain types for the Amity messaging core.
//!
//! This crate holds the data shapes exchanged between the core logic,
//! the infrastructure adapters, and the presentation layer: messages,
//! conversations, backend request types, and the error taxonomy. It has
//! no IO dependencies.

pub mod backend;
pub mod conversation;
pub mod error;
pub mod message;
