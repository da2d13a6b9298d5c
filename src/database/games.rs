use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use super::models::Game;

pub fn upsert_game(conn: &Connection, name: &str) -> Result<Game> {
    if let Some(existing) = find_by_name(conn, name)? {
        return Ok(existing);
    }

    let sql = "INSERT INTO games (name) VALUES (?1) RETURNING id, name";
    conn.query_row(sql, params![name], parse_game_row)
        .context("Failed to insert game")
}

fn parse_game_row(row: &rusqlite::Row) -> rusqlite::Result<Game> {
    Ok(Game {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Game>> {
    let sql = "SELECT id, name FROM games WHERE name = ?1";

    conn.query_row(sql, params![name], parse_game_row)
        .optional()
        .context("Failed to query game by name")
}

pub fn list_all(conn: &Connection) -> Result<Vec<Game>> {
    let sql = "SELECT id, name FROM games ORDER BY name";

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], parse_game_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}
