pub mod glicko;
pub mod types;

pub use glicko::Glicko2;
pub use types::{LeagueId, OpponentSample, PlayerId, RatingAlgorithm, RatingState};
