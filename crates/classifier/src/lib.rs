pub mod cache;
pub mod guard;
pub mod model;
pub mod prompt;

pub use cache::{fingerprint, TtlCache};
pub use guard::{missing_required_params, validate_draft, GuardError};
pub use model::{DecisionModel, GeminiModel, ModelError};
pub use prompt::classifier_prompt;
