//! Core data types for the Carton dependency resolver.
//!
//! This crate defines the value types the resolver works with: semantic and
//! pinned versions, version specifiers, dependency identities and the
//! requirement edges between them, plus the user-level resolver
//! configuration.
//!
//! This crate is intentionally free of async code and network I/O.

pub mod config;
pub mod dependency;
pub mod version;
