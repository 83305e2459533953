pub mod metadata;
pub mod placement;
pub mod ranking;
pub mod similarity;
pub mod tiers;

pub use metadata::{ContentProvider, TmdbProvider};
pub use placement::{Choice, PlacementRequest, PlacementSession, Resolution};
pub use ranking::{InvariantViolation, MutationOutcome, RankingEngine, RepairReport};
