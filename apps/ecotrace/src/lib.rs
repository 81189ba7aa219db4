//! # Ecotrace Application Library
//!
//! Exposes the HTTP API and CLI modules so integration tests can drive the
//! router in-process (via `ecotrace::api::*`) without spawning the binary.

pub mod api;
pub mod cli;
