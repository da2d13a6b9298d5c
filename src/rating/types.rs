use serde::{Deserialize, Serialize};

pub type PlayerId = i32;
pub type LeagueId = i32;

/// A player's standing in one league.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingState {
    pub rating: f64,
    /// Lower means more certain.
    pub deviation: f64,
    pub volatility: f64,
}

/// One game played during a rating period, seen from the rated player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpponentSample {
    pub opponent: RatingState,
    /// 1.0 win, 0.5 draw, 0.0 loss
    pub score: f64,
}

/// Rating update rule applied once per closed session.
pub trait RatingAlgorithm: Send + Sync {
    /// Standing of a player with no rated history.
    fn initial(&self) -> RatingState;

    /// New standing after the games in `samples`. Must be a pure function of
    /// its inputs so that replays are reproducible.
    fn rate(&self, current: RatingState, samples: &[OpponentSample]) -> RatingState;
}
