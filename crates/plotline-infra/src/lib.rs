//! Infrastructure layer for Plotline.
//!
//! Contains the concrete [`BackendAdapter`](plotline_core::llm::adapter::BackendAdapter)
//! implementations (Anthropic, OpenAI-compatible, Ollama), the shared HTTP
//! outcome mapping, `config.toml` loading, and registry construction from
//! configuration plus environment credentials.

pub mod config;
pub mod llm;
