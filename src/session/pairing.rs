use crate::rating::types::PlayerId;

use super::{Outcome, RaceResult};

/// Result of matchmaking joined players at session start.
#[derive(Debug, Clone, PartialEq)]
pub struct Pairing {
    pub pairs: Vec<(PlayerId, PlayerId)>,
    /// Player left without an opponent when the count is odd.
    pub left_out: Option<PlayerId>,
}

/// Pairs players of similar rating together.
///
/// Players are ordered by rating (highest first, then by id) and matched
/// with their neighbour. The lowest rated player sits out on odd counts.
pub fn pair_by_rating(players: &[(PlayerId, f64)]) -> Pairing {
    let mut ordered = players.to_vec();
    ordered.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut chunks = ordered.chunks_exact(2);
    let pairs = chunks.by_ref().map(|pair| (pair[0].0, pair[1].0)).collect();
    let left_out = chunks.remainder().first().map(|(id, _)| *id);

    Pairing { pairs, left_out }
}

/// Decides both outcomes of a head-to-head race. A missing result counts as
/// a forfeit.
pub fn resolve_outcomes(a: Option<RaceResult>, b: Option<RaceResult>) -> (Outcome, Outcome) {
    let a = a.unwrap_or(RaceResult::Forfeit);
    let b = b.unwrap_or(RaceResult::Forfeit);

    match (a, b) {
        (RaceResult::Finished(ta), RaceResult::Finished(tb)) => match ta.cmp(&tb) {
            std::cmp::Ordering::Less => (Outcome::Win, Outcome::Loss),
            std::cmp::Ordering::Greater => (Outcome::Loss, Outcome::Win),
            std::cmp::Ordering::Equal => (Outcome::Draw, Outcome::Draw),
        },
        (RaceResult::Finished(_), RaceResult::Forfeit) => (Outcome::Win, Outcome::Forfeit),
        (RaceResult::Forfeit, RaceResult::Finished(_)) => (Outcome::Forfeit, Outcome::Win),
        (RaceResult::Forfeit, RaceResult::Forfeit) => (Outcome::Forfeit, Outcome::Forfeit),
    }
}

/// Rating score of `outcome` against an opponent who got `opponent`.
pub fn score(outcome: Outcome, opponent: Outcome) -> f64 {
    match (outcome, opponent) {
        (Outcome::Win, _) => 1.0,
        (Outcome::Draw, _) => 0.5,
        // double forfeit is rated as a draw
        (Outcome::Forfeit, Outcome::Forfeit) => 0.5,
        (Outcome::Loss | Outcome::Forfeit, _) => 0.0,
    }
}
