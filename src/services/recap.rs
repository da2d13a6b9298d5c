use anyhow::Result;
use rusqlite::Connection;

use crate::database::{League, MatchEntry, MatchSession, matches};
use crate::external::notifier::{RecapEntry, RecapMatch, SessionRecap};

/// How much of a session a recap reveals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecapScope {
    /// Players and outcomes only, safe while a race is running.
    Public,
    /// Adds the seed and finish times.
    Full,
}

pub fn build_recap(
    conn: &Connection,
    league: &League,
    session: &MatchSession,
    scope: RecapScope,
) -> Result<SessionRecap> {
    let entries = matches::list_entries_for_session(conn, session.id)?;

    Ok(SessionRecap {
        league: league.short_code.clone(),
        session_id: session.id,
        status: session.status,
        start_date: session.start_date,
        matches: group_by_match(&entries)
            .into_iter()
            .map(|group| RecapMatch {
                seed: match scope {
                    RecapScope::Full => session.seed.clone(),
                    RecapScope::Public => None,
                },
                entries: group.iter().map(|entry| recap_entry(entry, scope)).collect(),
            })
            .collect(),
    })
}

fn recap_entry(entry: &MatchEntry, scope: RecapScope) -> RecapEntry {
    RecapEntry {
        player_name: entry.player_name.clone(),
        outcome: entry.outcome,
        finish_seconds: match scope {
            RecapScope::Full => entry.finish_seconds(),
            RecapScope::Public => None,
        },
    }
}

/// Splits entries ordered by match id into one slice per match.
pub fn group_by_match(entries: &[MatchEntry]) -> Vec<&[MatchEntry]> {
    entries.chunk_by(|a, b| a.match_id == b.match_id).collect()
}
