//! In-app messaging for the campus backend: message persistence plus a live
//! notification pipeline drained by server-sent event streams.

pub mod config;
pub mod error;
pub mod messaging;
pub mod telemetry;
