pub mod airports;
pub mod canonical;
pub mod config;
pub mod label;
pub mod models;
pub mod taxonomy;

pub use airports::country_of;
pub use canonical::Canonical;
pub use config::AdvisorConfig;
pub use label::normalize_label;
pub use models::*;
pub use taxonomy::{Taxonomy, VerdictTemplate};
