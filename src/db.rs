use crate::visibility::PublicField;
use anyhow::Context;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "gradelookup.sqlite3";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!("failed to create workspace {}", workspace.to_string_lossy())
    })?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    init_schema(&conn)?;
    tracing::info!(path = %db_path.to_string_lossy(), "workspace database ready");
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    // nota_parcial / recuperatorio are untyped so a grade keeps whatever type it was entered as.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            dni TEXT PRIMARY KEY,
            apellidos TEXT NOT NULL,
            nombres TEXT NOT NULL,
            materia TEXT NOT NULL,
            nota_parcial,
            recuperatorio,
            porcentaje_asistencia INTEGER CHECK (porcentaje_asistencia BETWEEN 0 AND 100),
            porcentaje_tp_aprobados INTEGER CHECK (porcentaje_tp_aprobados BETWEEN 0 AND 100),
            diario_clase TEXT,
            condicion TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_names ON students(apellidos, nombres)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS visibility_settings(
            field_name TEXT PRIMARY KEY,
            is_visible INTEGER NOT NULL DEFAULT 1,
            label TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    seed_visibility_settings(conn)?;

    Ok(())
}

// Seeds missing rows only; admin choices survive re-opening the workspace.
fn seed_visibility_settings(conn: &Connection) -> anyhow::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO visibility_settings(field_name, is_visible, label, sort_order, updated_at)
         VALUES(?, 1, ?, ?, ?)",
    )?;
    let now = now_rfc3339();
    for (i, field) in PublicField::ALL.into_iter().enumerate() {
        stmt.execute((field.key(), field.default_label(), i as i64, &now))?;
    }
    Ok(())
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
