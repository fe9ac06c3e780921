//! # rpcwache-observability
//!
//! Structured Logging via tracing-subscriber (Text oder JSON).

pub mod logging;

pub use logging::{log_level_gueltig, logging_initialisieren, LogFormat};
