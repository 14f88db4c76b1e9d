pub mod manual;
pub mod orchestrator;
pub mod output;

pub use manual::{InputEvent, ManualChannel, ManualFallbackHandler};
pub use orchestrator::{GenerationPlan, ResilientGenerationOrchestrator};
