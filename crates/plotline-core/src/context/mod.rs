//! Context engineering: estimate, classify, window, and fit content blocks.

pub mod allocator;
pub mod builder;
pub mod classifier;
pub mod estimator;
pub mod truncate;
pub mod window;
