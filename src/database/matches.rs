use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};

use super::models::{MatchEntry, MatchRow};
use crate::rating::{LeagueId, PlayerId};
use crate::session::{Outcome, RaceResult};

const ENTRY_COLUMNS: &str = "e.id, e.match_id, e.session_id, e.player_id, p.name, e.result, e.finish_seconds, e.submitted_at, e.outcome";

pub fn insert_match(conn: &Connection, session_id: i32, league_id: LeagueId) -> Result<MatchRow> {
    let sql = "INSERT INTO matches (session_id, league_id) VALUES (?1, ?2) RETURNING id, session_id, league_id";

    conn.query_row(sql, params![session_id, league_id], parse_match_row)
        .context("Failed to insert match")
}

fn parse_match_row(row: &rusqlite::Row) -> rusqlite::Result<MatchRow> {
    Ok(MatchRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        league_id: row.get(2)?,
    })
}

pub fn insert_entry(conn: &Connection, match_id: i32, session_id: i32, player_id: PlayerId) -> Result<()> {
    conn.execute(
        "INSERT INTO match_entries (match_id, session_id, player_id) VALUES (?1, ?2, ?3)",
        params![match_id, session_id, player_id],
    )
    .context("Failed to insert match entry")?;
    Ok(())
}

pub fn list_matches_for_session(conn: &Connection, session_id: i32) -> Result<Vec<MatchRow>> {
    let sql = "SELECT id, session_id, league_id FROM matches WHERE session_id = ?1 ORDER BY id";

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![session_id], parse_match_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

fn parse_entry_row(row: &rusqlite::Row) -> rusqlite::Result<MatchEntry> {
    let result = match row.get::<_, Option<String>>(5)?.as_deref() {
        None => None,
        Some("forfeit") => Some(RaceResult::Forfeit),
        Some("finished") => Some(RaceResult::Finished(row.get(6)?)),
        Some(other) => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                5,
                Type::Text,
                format!("unknown race result '{other}'").into(),
            ));
        }
    };

    Ok(MatchEntry {
        id: row.get(0)?,
        match_id: row.get(1)?,
        session_id: row.get(2)?,
        player_id: row.get(3)?,
        player_name: row.get(4)?,
        result,
        submitted_at: row.get(7)?,
        outcome: row.get(8)?,
    })
}

/// Entries of a session ordered by match, then entry id.
pub fn list_entries_for_session(conn: &Connection, session_id: i32) -> Result<Vec<MatchEntry>> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM match_entries e
         INNER JOIN players p ON (e.player_id = p.id)
         WHERE e.session_id = ?1
         ORDER BY e.match_id, e.id"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![session_id], parse_entry_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

pub fn find_entry(conn: &Connection, session_id: i32, player_id: PlayerId) -> Result<Option<MatchEntry>> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM match_entries e
         INNER JOIN players p ON (e.player_id = p.id)
         WHERE e.session_id = ?1 AND e.player_id = ?2"
    );

    conn.query_row(&sql, params![session_id, player_id], parse_entry_row)
        .optional()
        .context("Failed to query match entry")
}

pub fn record_result(
    conn: &Connection,
    entry_id: i32,
    result: RaceResult,
    submitted_at: DateTime<Utc>,
) -> Result<()> {
    let (kind, seconds) = match result {
        RaceResult::Finished(seconds) => ("finished", Some(seconds)),
        RaceResult::Forfeit => ("forfeit", None),
    };

    conn.execute(
        "UPDATE match_entries SET result = ?1, finish_seconds = ?2, submitted_at = ?3 WHERE id = ?4",
        params![kind, seconds, submitted_at, entry_id],
    )
    .context("Failed to record race result")?;
    Ok(())
}

pub fn set_outcome(conn: &Connection, entry_id: i32, outcome: Outcome) -> Result<()> {
    conn.execute(
        "UPDATE match_entries SET outcome = ?1 WHERE id = ?2",
        params![outcome, entry_id],
    )
    .context("Failed to set match outcome")?;
    Ok(())
}

/// Removes the matches of a session that never raced.
pub fn delete_for_session(conn: &Connection, session_id: i32) -> Result<usize> {
    conn.execute("DELETE FROM match_entries WHERE session_id = ?1", params![session_id])
        .context("Failed to delete match entries")?;
    let deleted = conn
        .execute("DELETE FROM matches WHERE session_id = ?1", params![session_id])
        .context("Failed to delete matches")?;
    Ok(deleted)
}

pub fn count_pending(conn: &Connection, session_id: i32) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM match_entries WHERE session_id = ?1 AND result IS NULL",
        params![session_id],
        |row| row.get(0),
    )
    .context("Failed to count pending entries")
}
