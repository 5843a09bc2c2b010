mod conflict;
mod context;
mod resolver;

pub use conflict::{reconcile, ConflictReport, ConflictSlot};
pub use context::ItineraryContext;
pub use resolver::{resolve, ResolverOutcome};
