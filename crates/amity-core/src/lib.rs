//! Business logic and port definitions for the Amity messaging core.
//!
//! This crate defines the "ports" (the [`store::MessageStore`] repository
//! trait and the [`backend::CoachBackend`] provider trait) that the
//! infrastructure layer implements, plus the pure components: admission
//! control, the conversation-history cache, the stream reconstructor, and
//! the orchestrating pipeline. It depends only on `amity-types` -- never on
//! `amity-infra` or any database/HTTP crate.

pub mod admission;
pub mod backend;
pub mod clock;
pub mod context;
pub mod pipeline;
pub mod store;
pub mod stream;
