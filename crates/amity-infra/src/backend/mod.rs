//! HTTP adapter for the generative coaching backend.

pub mod http;

pub use http::HttpCoachBackend;
