use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};

use super::models::League;
use crate::rating::LeagueId;
use crate::schedule::Schedule;

const LEAGUE_COLUMNS: &str = "id, game_id, short_code, name, settings_ref, announce_channel, schedule";

pub fn insert_league(
    conn: &Connection,
    game_id: i32,
    short_code: &str,
    name: &str,
    settings_ref: &str,
    schedule: &Schedule,
) -> Result<League> {
    let sql = format!(
        "INSERT INTO leagues (game_id, short_code, name, settings_ref, schedule) VALUES (?1, ?2, ?3, ?4, ?5) RETURNING {LEAGUE_COLUMNS}"
    );
    let schedule = serde_json::to_string(schedule).context("Failed to serialize schedule")?;

    conn.query_row(
        &sql,
        params![game_id, short_code, name, settings_ref, schedule],
        parse_league_row,
    )
    .context("Failed to insert league")
}

fn parse_league_row(row: &rusqlite::Row) -> rusqlite::Result<League> {
    let raw_schedule: String = row.get(6)?;
    let schedule = serde_json::from_str(&raw_schedule)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(League {
        id: row.get(0)?,
        game_id: row.get(1)?,
        short_code: row.get(2)?,
        name: row.get(3)?,
        settings_ref: row.get(4)?,
        announce_channel: row.get(5)?,
        schedule,
    })
}

pub fn find_by_short_code(conn: &Connection, short_code: &str) -> Result<Option<League>> {
    let sql = format!("SELECT {LEAGUE_COLUMNS} FROM leagues WHERE short_code = ?1");

    conn.query_row(&sql, params![short_code], parse_league_row)
        .optional()
        .context("Failed to query league by short code")
}

pub fn find_by_id(conn: &Connection, id: LeagueId) -> Result<Option<League>> {
    let sql = format!("SELECT {LEAGUE_COLUMNS} FROM leagues WHERE id = ?1");

    conn.query_row(&sql, params![id], parse_league_row)
        .optional()
        .context("Failed to query league by id")
}

pub fn list_all(conn: &Connection) -> Result<Vec<League>> {
    let sql = format!("SELECT {LEAGUE_COLUMNS} FROM leagues ORDER BY id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], parse_league_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

pub fn update_schedule(conn: &Connection, id: LeagueId, schedule: &Schedule) -> Result<()> {
    let schedule = serde_json::to_string(schedule).context("Failed to serialize schedule")?;
    conn.execute(
        "UPDATE leagues SET schedule = ?1 WHERE id = ?2",
        params![schedule, id],
    )
    .context("Failed to update league schedule")?;
    Ok(())
}

pub fn update_announce_channel(conn: &Connection, id: LeagueId, channel: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE leagues SET announce_channel = ?1 WHERE id = ?2",
        params![channel, id],
    )
    .context("Failed to update league announce channel")?;
    Ok(())
}
