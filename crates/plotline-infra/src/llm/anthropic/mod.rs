//! Anthropic Claude backend (Tagged prompt family).

pub mod client;
pub mod types;

pub use client::AnthropicAdapter;
