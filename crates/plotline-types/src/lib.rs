//! Shared domain types for Plotline.
//!
//! This crate contains the data model of the generation layer: requests and
//! content blocks, backend descriptors, attempt outcomes, output shapes with
//! their validation, configuration, and error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod generation;
pub mod outcome;
pub mod shape;
