pub mod sanitize;
pub mod synthesizer;

pub use sanitize::sanitize;
pub use synthesizer::{GenerationError, QuerySynthesizer};
