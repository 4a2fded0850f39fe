//! SQLite schema mirroring the hosted store
//!
//! Tables:
//! - prefectures: prefecture names
//! - halls: hall names, unique per prefecture
//! - models: canonical model names
//! - results: one row per (hall, model, unit, date)
//!
//! View:
//! - result_joined: results with names resolved, read by the dashboard

use rusqlite::{Connection, Result};

/// Create all tables and views in the database
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS prefectures (
            prefecture_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
        [],
    )?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS halls (
            hall_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            prefecture_id INTEGER NOT NULL REFERENCES prefectures(prefecture_id),
            UNIQUE(name, prefecture_id)
        )
        "#,
        [],
    )?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS models (
            model_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
        [],
    )?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS results (
            hall_id INTEGER NOT NULL REFERENCES halls(hall_id),
            model_id INTEGER NOT NULL REFERENCES models(model_id),
            unit_no INTEGER NOT NULL,
            date TEXT NOT NULL,
            game INTEGER NOT NULL,
            bb INTEGER NOT NULL,
            rb INTEGER NOT NULL,
            medal INTEGER NOT NULL,
            UNIQUE(hall_id, model_id, unit_no, date)
        )
        "#,
        [],
    )?;

    conn.execute(
        r#"
        CREATE VIEW IF NOT EXISTS result_joined AS
        SELECT
            r.date AS date,
            p.name AS pref,
            h.name AS hall,
            m.name AS model,
            r.unit_no AS unit_no,
            r.game AS game,
            r.bb AS bb,
            r.rb AS rb,
            r.medal AS medal
        FROM results r
        JOIN halls h ON h.hall_id = r.hall_id
        JOIN prefectures p ON p.prefecture_id = h.prefecture_id
        JOIN models m ON m.model_id = r.model_id
        "#,
        [],
    )?;

    create_indexes(conn)?;

    Ok(())
}

/// Create indexes for the dashboard's date-range reads
fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_date ON results(date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_halls_prefecture ON halls(prefecture_id)",
        [],
    )?;
    Ok(())
}
