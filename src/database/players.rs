use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use super::models::Player;
use crate::rating::PlayerId;

const PLAYER_COLUMNS: &str = "id, name, discord_id, stream_url";

pub fn insert_player(
    conn: &Connection,
    name: &str,
    discord_id: Option<&str>,
    stream_url: Option<&str>,
) -> Result<Player> {
    let sql = format!(
        "INSERT INTO players (name, discord_id, stream_url) VALUES (?1, ?2, ?3) RETURNING {PLAYER_COLUMNS}"
    );

    conn.query_row(&sql, params![name, discord_id, stream_url], parse_player_row)
        .context("Failed to insert new player")
}

fn parse_player_row(row: &rusqlite::Row) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(0)?,
        name: row.get(1)?,
        discord_id: row.get(2)?,
        stream_url: row.get(3)?,
    })
}

pub fn find_by_id(conn: &Connection, id: PlayerId) -> Result<Option<Player>> {
    let sql = format!("SELECT {PLAYER_COLUMNS} FROM players WHERE id = ?1");

    conn.query_row(&sql, params![id], parse_player_row)
        .optional()
        .context("Failed to query player by id")
}

pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Player>> {
    let sql = format!("SELECT {PLAYER_COLUMNS} FROM players WHERE name = ?1");

    conn.query_row(&sql, params![name], parse_player_row)
        .optional()
        .context("Failed to query player by name")
}

pub fn find_by_discord_id(conn: &Connection, discord_id: &str) -> Result<Option<Player>> {
    let sql = format!("SELECT {PLAYER_COLUMNS} FROM players WHERE discord_id = ?1 LIMIT 1");

    conn.query_row(&sql, params![discord_id], parse_player_row)
        .optional()
        .context("Failed to query player by discord id")
}
