use crate::error::{AppError, AppResult};
use crate::model::{Score, StudentRecord};
use crate::students::{self, BatchInsertError};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

pub const EXPECTED_COLUMNS: [&str; 10] = [
    "dni",
    "apellidos",
    "nombres",
    "materia",
    "nota_parcial",
    "recuperatorio",
    "porcentaje_asistencia",
    "porcentaje_tp_aprobados",
    "diario_clase",
    "condicion",
];

pub const MAX_IMPORT_ROWS: usize = 10_000;

const DEFAULT_MATERIA: &str = "Sin Asignar";
const DEFAULT_CONDICION: &str = "Sin Condición";

/// One data row of the import file, values trimmed, not yet coerced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateRecord {
    pub line_no: usize,
    pub dni: String,
    pub apellidos: String,
    pub nombres: String,
    pub materia: String,
    pub nota_parcial: String,
    pub recuperatorio: String,
    pub porcentaje_asistencia: String,
    pub porcentaje_tp_aprobados: String,
    pub diario_clase: String,
    pub condicion: String,
}

impl CandidateRecord {
    fn into_record(self) -> StudentRecord {
        let line_no = self.line_no;
        StudentRecord {
            porcentaje_asistencia: parse_percentage(&self.porcentaje_asistencia, line_no),
            porcentaje_tp_aprobados: parse_percentage(&self.porcentaje_tp_aprobados, line_no),
            nota_parcial: non_empty(self.nota_parcial).map(Score::Text),
            recuperatorio: non_empty(self.recuperatorio).map(Score::Text),
            diario_clase: non_empty(self.diario_clase),
            materia: non_empty(self.materia).unwrap_or_else(|| DEFAULT_MATERIA.to_string()),
            condicion: non_empty(self.condicion).unwrap_or_else(|| DEFAULT_CONDICION.to_string()),
            dni: self.dni,
            apellidos: self.apellidos,
            nombres: self.nombres,
            created_at: None,
            updated_at: None,
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Leading-integer parse: "85" and "85.5" give 85, "abc" gives nothing.
fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim();
    let digits_start = usize::from(s.starts_with(['+', '-']));
    let digits_len = s[digits_start..]
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits_len == 0 {
        return None;
    }
    s[..digits_start + digits_len].parse().ok()
}

fn parse_percentage(raw: &str, line_no: usize) -> Option<i64> {
    let n = parse_int_prefix(raw)?;
    if (0..=100).contains(&n) {
        Some(n)
    } else {
        tracing::warn!(line = line_no, value = n, "percentage outside 0-100 imported as null");
        None
    }
}

fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => out.push(std::mem::take(&mut buf)),
            _ => buf.push(ch),
        }
    }
    out.push(buf);
    out
}

/// Splits text into records with the 0-based line each one starts on.
/// A newline inside a quoted field belongs to the field.
fn split_records(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    let mut start_line = 0;
    let mut line = 0;
    for (i, b) in text.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'\n' => {
                line += 1;
                if !in_quotes {
                    out.push((start_line, text[start..i].trim_end_matches('\r')));
                    start = i + 1;
                    start_line = line;
                }
            }
            _ => {}
        }
    }
    if start < text.len() {
        out.push((start_line, &text[start..]));
    }
    out
}

/// Parses import text. The header must name all ten columns (any order, any case).
pub fn parse_csv(text: &str) -> AppResult<Vec<CandidateRecord>> {
    let mut lines = split_records(text)
        .into_iter()
        .filter(|(_, l)| !l.trim().is_empty());
    let Some((_, header_line)) = lines.next() else {
        return Err(AppError::Validation(
            "the CSV file is empty; it needs a header row and at least one data row".to_string(),
        ));
    };

    let header: HashMap<String, usize> = parse_csv_record(header_line.trim_start_matches('\u{feff}'))
        .into_iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
        .collect();
    let missing: Vec<String> = EXPECTED_COLUMNS
        .iter()
        .filter(|c| !header.contains_key(**c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(AppError::MissingColumns(missing));
    }

    let rows: Vec<CandidateRecord> = lines
        .map(|(i, line)| {
            let fields = parse_csv_record(line);
            let col = |name: &str| {
                header
                    .get(name)
                    .and_then(|idx| fields.get(*idx))
                    .map(|v| v.trim().to_string())
                    .unwrap_or_default()
            };
            CandidateRecord {
                line_no: i + 1,
                dni: col("dni"),
                apellidos: col("apellidos"),
                nombres: col("nombres"),
                materia: col("materia"),
                nota_parcial: col("nota_parcial"),
                recuperatorio: col("recuperatorio"),
                porcentaje_asistencia: col("porcentaje_asistencia"),
                porcentaje_tp_aprobados: col("porcentaje_tp_aprobados"),
                diario_clase: col("diario_clase"),
                condicion: col("condicion"),
            }
        })
        .collect();

    if rows.is_empty() {
        return Err(AppError::Validation(
            "the CSV file has a header but no data rows".to_string(),
        ));
    }
    Ok(rows)
}

/// Where every incoming row ends up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportPlan {
    pub to_insert: Vec<StudentRecord>,
    pub skipped_duplicate_ids: Vec<String>,
    pub repeated_in_batch_ids: Vec<String>,
    pub dropped_empty_dni: usize,
}

/// Partitions rows against the DNIs already stored. First occurrence of a new DNI wins.
pub fn plan_import(rows: Vec<CandidateRecord>, existing: &HashSet<String>) -> ImportPlan {
    let mut plan = ImportPlan::default();
    let mut seen = HashSet::new();
    for row in rows {
        if row.dni.is_empty() {
            plan.dropped_empty_dni += 1;
        } else if existing.contains(&row.dni) {
            plan.skipped_duplicate_ids.push(row.dni);
        } else if !seen.insert(row.dni.clone()) {
            plan.repeated_in_batch_ids.push(row.dni);
        } else {
            plan.to_insert.push(row.into_record());
        }
    }
    plan
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("the batch has {0} rows; at most {MAX_IMPORT_ROWS} can be imported at once")]
    TooLarge(usize),

    #[error("the CSV file did not contain any row with a dni")]
    NoValidDni,

    #[error("no new students to import: every dni already exists or repeats an earlier row")]
    NothingToImport,

    #[error("duplicate dni during the bulk insert, nothing was imported; check that dnis are unique and run the import again ({0})")]
    DuplicateOnInsert(String),

    #[error(transparent)]
    Store(AppError),
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::TooLarge(_) => "bad_params",
            ImportError::NoValidDni | ImportError::NothingToImport => "nothing_to_import",
            ImportError::DuplicateOnInsert(_) => "duplicate_key",
            ImportError::Store(e) => e.code(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ImportError::Store(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub rows_total: usize,
    pub inserted_count: usize,
    pub skipped_duplicate_ids: Vec<String>,
    pub repeated_in_batch_ids: Vec<String>,
    pub dropped_empty_dni: usize,
    #[serde(skip)]
    pub error: Option<ImportError>,
}

/// One existence query, then one transactional bulk insert.
pub fn import_batch(conn: &Connection, rows: Vec<CandidateRecord>) -> ImportReport {
    let mut report = ImportReport {
        rows_total: rows.len(),
        ..Default::default()
    };
    if rows.len() > MAX_IMPORT_ROWS {
        report.error = Some(ImportError::TooLarge(rows.len()));
        return report;
    }

    let mut incoming: Vec<String> = rows
        .iter()
        .filter(|r| !r.dni.is_empty())
        .map(|r| r.dni.clone())
        .collect();
    incoming.sort();
    incoming.dedup();
    if incoming.is_empty() {
        report.dropped_empty_dni = rows.len();
        report.error = Some(ImportError::NoValidDni);
        return report;
    }

    let existing = match students::existing_dnis(conn, &incoming) {
        Ok(v) => v,
        Err(e) => {
            report.error = Some(ImportError::Store(e));
            return report;
        }
    };

    let plan = plan_import(rows, &existing);
    report.skipped_duplicate_ids = plan.skipped_duplicate_ids;
    report.repeated_in_batch_ids = plan.repeated_in_batch_ids;
    report.dropped_empty_dni = plan.dropped_empty_dni;
    tracing::info!(
        to_insert = plan.to_insert.len(),
        skipped = report.skipped_duplicate_ids.len(),
        repeated = report.repeated_in_batch_ids.len(),
        dropped = report.dropped_empty_dni,
        "import planned"
    );

    if plan.to_insert.is_empty() {
        report.error = Some(ImportError::NothingToImport);
        return report;
    }

    match students::insert_batch(conn, &plan.to_insert) {
        Ok(n) => report.inserted_count = n,
        Err(BatchInsertError::Duplicate(msg)) => {
            report.error = Some(ImportError::DuplicateOnInsert(msg));
        }
        Err(BatchInsertError::Store(e)) => report.error = Some(ImportError::Store(e)),
    }
    report
}
