//! Shared utilities for the Carton dependency resolver.
//!
//! This crate provides the cross-cutting error type used by every other
//! Carton crate, so resolution failures can be matched structurally by
//! callers and rendered as `miette` diagnostics.

pub mod errors;
