//! The model-backed stages of the pipeline.
//!
//! Each stage wraps its model call in the stage's timeout and converts every
//! failure into that stage's fail-safe value at its boundary, so callers never
//! see a per-message error.

mod draft;
mod emergency;
mod precheck;
pub(crate) mod prompts;
mod refine;

pub use draft::{Draft, DraftGenerator, FALLBACK_REPLY};
pub use emergency::EmergencyDetector;
pub use precheck::PreCheckAnalyzer;
pub use refine::{attach_resources, Refinement, ResponseRefiner, EMERGENCY_PLACEHOLDER};
