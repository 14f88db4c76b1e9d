//! Backend abstractions for Plotline.
//!
//! - `BackendAdapter`: RPITIT trait for concrete protocol clients
//! - `BoxBackendAdapter`: Object-safe wrapper for dynamic dispatch
//! - `BackendRegistry`: immutable set of configured backends
//! - `ProviderSelectionStrategy`: ordered candidates per use case and tier
//! - `HealthBoard`: cross-request health and quarantine tracking

pub mod adapter;
pub mod box_adapter;
pub mod health;
pub mod refusal;
pub mod registry;
pub mod selection;
