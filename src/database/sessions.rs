use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use super::models::MatchSession;
use crate::rating::{LeagueId, PlayerId};
use crate::session::SessionStatus;

const SESSION_COLUMNS: &str =
    "id, league_id, status, start_date, started_at, ended_at, seed, seed_patch IS NOT NULL";

/// Creates the session planned for `start_date` unless the league already
/// has one at that instant. Returns `None` when it already existed.
pub fn insert_if_absent(
    conn: &Connection,
    league_id: LeagueId,
    start_date: DateTime<Utc>,
) -> Result<Option<MatchSession>> {
    let sql = format!(
        "INSERT INTO match_sessions (league_id, status, start_date) VALUES (?1, ?2, ?3)
         ON CONFLICT (league_id, start_date) DO NOTHING
         RETURNING {SESSION_COLUMNS}"
    );

    conn.query_row(
        &sql,
        params![league_id, SessionStatus::Open, start_date],
        parse_session_row,
    )
    .optional()
    .context("Failed to insert match session")
}

fn parse_session_row(row: &rusqlite::Row) -> rusqlite::Result<MatchSession> {
    Ok(MatchSession {
        id: row.get(0)?,
        league_id: row.get(1)?,
        status: row.get(2)?,
        start_date: row.get(3)?,
        started_at: row.get(4)?,
        ended_at: row.get(5)?,
        seed: row.get(6)?,
        seed_ready: row.get(7)?,
    })
}

pub fn find_by_id(conn: &Connection, id: i32) -> Result<Option<MatchSession>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM match_sessions WHERE id = ?1");

    conn.query_row(&sql, params![id], parse_session_row)
        .optional()
        .context("Failed to query match session by id")
}

pub fn find_by_seed(conn: &Connection, seed: &str) -> Result<Option<MatchSession>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM match_sessions WHERE seed = ?1");

    conn.query_row(&sql, params![seed], parse_session_row)
        .optional()
        .context("Failed to query match session by seed")
}

/// Earliest session of the league that has not started yet.
pub fn find_next_open(conn: &Connection, league_id: LeagueId) -> Result<Option<MatchSession>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM match_sessions
         WHERE league_id = ?1 AND status = ?2
         ORDER BY start_date ASC LIMIT 1"
    );

    conn.query_row(&sql, params![league_id, SessionStatus::Open], parse_session_row)
        .optional()
        .context("Failed to query next open session")
}

pub fn list_by_status(
    conn: &Connection,
    league_id: LeagueId,
    status: SessionStatus,
) -> Result<Vec<MatchSession>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM match_sessions
         WHERE league_id = ?1 AND status = ?2
         ORDER BY start_date ASC, id ASC"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![league_id, status], parse_session_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

/// Sessions of any league whose start date lies in `[from, to]`, newest first.
pub fn list_between(
    conn: &Connection,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    statuses: &[SessionStatus],
) -> Result<Vec<MatchSession>> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; statuses.len()].join(", ");
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM match_sessions
         WHERE start_date >= ? AND start_date <= ? AND status IN ({placeholders})
         ORDER BY start_date DESC, id DESC"
    );

    let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(from), Box::new(to)];
    values.extend(statuses.iter().map(|s| Box::new(*s) as Box<dyn rusqlite::ToSql>));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), parse_session_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

pub fn mark_active(
    conn: &Connection,
    id: i32,
    seed: Option<&str>,
    started_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE match_sessions SET status = ?1, seed = ?2, started_at = ?3 WHERE id = ?4",
        params![SessionStatus::Active, seed, started_at, id],
    )
    .context("Failed to mark session active")?;
    Ok(())
}

pub fn mark_closed(conn: &Connection, id: i32, ended_at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE match_sessions SET status = ?1, ended_at = ?2 WHERE id = ?3",
        params![SessionStatus::Closed, ended_at, id],
    )
    .context("Failed to mark session closed")?;
    Ok(())
}

/// Stores the generator output. Written once.
pub fn store_seed_output(conn: &Connection, id: i32, patch: &[u8], spoiler_log: &str) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE match_sessions SET seed_patch = ?1, spoiler_log = ?2 WHERE id = ?3 AND seed_patch IS NULL",
            params![patch, spoiler_log, id],
        )
        .context("Failed to store seed output")?;
    Ok(updated == 1)
}

/// Remembers why generation failed. Returns true when it is the first
/// failure recorded for the session. A fatal failure stays fatal.
pub fn record_seed_failure(conn: &Connection, id: i32, message: &str, fatal: bool) -> Result<bool> {
    let first = conn
        .query_row(
            "SELECT seed_error IS NULL FROM match_sessions WHERE id = ?1",
            params![id],
            |row| row.get::<_, bool>(0),
        )
        .context("Failed to query seed failure")?;

    conn.execute(
        "UPDATE match_sessions SET seed_error = ?2, seed_error_fatal = MAX(seed_error_fatal, ?3) WHERE id = ?1",
        params![id, message, fatal],
    )
    .context("Failed to record seed failure")?;
    Ok(first)
}

/// Active sessions of the league still waiting for their seed output,
/// leaving out those whose generation failed for good.
pub fn list_awaiting_seed(conn: &Connection, league_id: LeagueId) -> Result<Vec<i32>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM match_sessions
         WHERE league_id = ?1 AND status = ?2 AND seed_patch IS NULL AND seed_error_fatal = 0
         ORDER BY start_date",
    )?;
    let ids = stmt
        .query_map(params![league_id, SessionStatus::Active], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i32>>>()
        .context("Failed to list sessions awaiting a seed")?;

    Ok(ids)
}

pub fn get_seed_patch(conn: &Connection, id: i32) -> Result<Option<Vec<u8>>> {
    conn.query_row(
        "SELECT seed_patch FROM match_sessions WHERE id = ?1",
        params![id],
        |row| row.get::<_, Option<Vec<u8>>>(0),
    )
    .optional()
    .map(Option::flatten)
    .context("Failed to load seed patch")
}

pub fn get_spoiler_log(conn: &Connection, id: i32) -> Result<Option<String>> {
    conn.query_row(
        "SELECT spoiler_log FROM match_sessions WHERE id = ?1",
        params![id],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()
    .map(Option::flatten)
    .context("Failed to load spoiler log")
}

pub fn add_player(
    conn: &Connection,
    session_id: i32,
    player_id: PlayerId,
    joined_at: DateTime<Utc>,
) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT INTO session_players (session_id, player_id, joined_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (session_id, player_id) DO NOTHING",
            params![session_id, player_id, joined_at],
        )
        .context("Failed to add player to session")?;
    Ok(inserted == 1)
}

pub fn remove_player(conn: &Connection, session_id: i32, player_id: PlayerId) -> Result<bool> {
    let deleted = conn
        .execute(
            "DELETE FROM session_players WHERE session_id = ?1 AND player_id = ?2",
            params![session_id, player_id],
        )
        .context("Failed to remove player from session")?;
    Ok(deleted == 1)
}

pub fn list_player_ids(conn: &Connection, session_id: i32) -> Result<Vec<PlayerId>> {
    let mut stmt = conn.prepare(
        "SELECT player_id FROM session_players WHERE session_id = ?1 ORDER BY joined_at, player_id",
    )?;
    let rows = stmt
        .query_map(params![session_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}
