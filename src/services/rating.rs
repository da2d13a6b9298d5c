use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use super::recap::group_by_match;
use crate::database::{MatchSession, matches, ratings};
use crate::errors::LadderError;
use crate::rating::{LeagueId, OpponentSample, PlayerId, RatingAlgorithm, RatingState};
use crate::session::pairing::score;

/// Applies one closed session to the league ratings.
///
/// The session is a single rating period: every participant is rated
/// against the standings their opponents had before the session. Used both
/// when a session closes and when replaying history, so both paths produce
/// the same numbers.
pub fn rate_session(
    conn: &Connection,
    algorithm: &dyn RatingAlgorithm,
    session: &MatchSession,
    rated_at: DateTime<Utc>,
) -> Result<usize> {
    for row in matches::list_matches_for_session(conn, session.id)? {
        if row.league_id != session.league_id {
            return Err(LadderError::Integrity(format!(
                "match {} belongs to league {} but its session {} belongs to league {}",
                row.id, row.league_id, session.id, session.league_id
            ))
            .into());
        }
    }

    let entries = matches::list_entries_for_session(conn, session.id)?;
    let mut samples: BTreeMap<PlayerId, Vec<(PlayerId, f64)>> = BTreeMap::new();

    for group in group_by_match(&entries) {
        let [a, b] = group else {
            return Err(LadderError::Integrity(format!(
                "match {} has {} entries",
                group[0].match_id,
                group.len()
            ))
            .into());
        };
        let (Some(outcome_a), Some(outcome_b)) = (a.outcome, b.outcome) else {
            return Err(LadderError::Integrity(format!(
                "match {} of closed session {} has no outcome",
                a.match_id, session.id
            ))
            .into());
        };

        samples
            .entry(a.player_id)
            .or_default()
            .push((b.player_id, score(outcome_a, outcome_b)));
        samples
            .entry(b.player_id)
            .or_default()
            .push((a.player_id, score(outcome_b, outcome_a)));
    }

    let mut before = BTreeMap::new();
    for player_id in samples.keys() {
        before.insert(*player_id, current_state(conn, algorithm, *player_id, session.league_id)?);
    }

    for (player_id, games) in &samples {
        let games: Vec<OpponentSample> = games
            .iter()
            .map(|(opponent, score)| OpponentSample {
                opponent: before[opponent],
                score: *score,
            })
            .collect();
        let updated = algorithm.rate(before[player_id], &games);
        ratings::upsert_rating(conn, *player_id, session.league_id, &updated, rated_at)?;
    }

    Ok(samples.len())
}

pub fn current_state(
    conn: &Connection,
    algorithm: &dyn RatingAlgorithm,
    player_id: PlayerId,
    league_id: LeagueId,
) -> Result<RatingState> {
    Ok(ratings::get_rating(conn, player_id, league_id)?.unwrap_or_else(|| algorithm.initial()))
}
