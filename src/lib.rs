//! Uniform connectors for Podman and Docker engines.
//!
//! `podbridge` talks to a container engine that runs either natively on the
//! host or inside a virtualization backend: a Lima VM on macOS or a WSL
//! distribution on Windows. Every connector exposes the same capabilities:
//! resolving its effective settings, checking that its prerequisites hold,
//! running read-only engine queries and supervising the engine's API service.
//!
//! Failures never escape the query and lifecycle methods. Unavailable
//! connectors, failed commands and undecodable output all yield empty
//! results; failed starts yield `false`. Details go to the log.
//!
//! # Modules
//!
//! - [`config`]: Configuration with layered precedence (CLI > env > file > defaults)
//!   and the persisted user settings store
//! - [`engine`]: Connector settings, availability, queries and the API runner
//! - [`error`]: Semantic error types for the library

pub mod config;
pub mod engine;
pub mod error;
