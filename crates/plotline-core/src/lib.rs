//! Generation pipeline for Plotline.
//!
//! This crate holds the protocol-independent parts: context estimation and
//! fitting, prompt rendering, backend selection and health, and the
//! resilient orchestrator. Concrete HTTP adapters live in `plotline-infra`;
//! this crate depends only on `plotline-types`.

pub mod context;
pub mod generation;
pub mod llm;
pub mod prompt;
