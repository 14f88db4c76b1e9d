//! Prompt rendering per backend family.

pub mod formatter;
pub mod shape_text;

pub use formatter::{FormattedPrompt, PromptFormatter};
