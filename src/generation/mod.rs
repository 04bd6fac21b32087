//! @ai:module:intent Artifact generation from prompts via a text-generation capability
//! @ai:module:layer application
//! @ai:module:public_api TextGenerator, OpenAiClient, DryRunGenerator, InputGenerator, GenerationReport, RateLimiter

pub mod client;
pub mod generator;
pub mod rate_limiter;

pub use client::{Completion, DryRunGenerator, OpenAiClient, TextGenerator};
pub use generator::{GeneratedArtifact, GenerationReport, InputGenerator};
pub use rate_limiter::{RateLimiter, RateLimiterTrait};
