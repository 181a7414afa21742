//! Per-message authenticated encryption.

pub mod codec;

pub use codec::{CipherError, MessageCodec, UNAVAILABLE_SENTINEL};
