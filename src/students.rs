use crate::db::now_rfc3339;
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::model::{validate_dni, StudentFields, StudentRecord};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashSet;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 500;

const COLUMNS: &str = "dni, apellidos, nombres, materia, nota_parcial, recuperatorio,
     porcentaje_asistencia, porcentaje_tp_aprobados, diario_clase, condicion,
     created_at, updated_at";

fn row_to_record(r: &Row<'_>) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        dni: r.get(0)?,
        apellidos: r.get(1)?,
        nombres: r.get(2)?,
        materia: r.get(3)?,
        nota_parcial: r.get(4)?,
        recuperatorio: r.get(5)?,
        porcentaje_asistencia: r.get(6)?,
        porcentaje_tp_aprobados: r.get(7)?,
        diario_clase: r.get(8)?,
        condicion: r.get(9)?,
        created_at: r.get(10)?,
        updated_at: r.get(11)?,
    })
}

fn store_err(op: &'static str, dni: Option<&str>, e: rusqlite::Error) -> AppError {
    tracing::error!(op, dni = dni.unwrap_or(""), error = %e, "student store query failed");
    AppError::store(op, e)
}

pub fn find(conn: &Connection, dni: &str) -> AppResult<Option<StudentRecord>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM students WHERE dni = ?"),
        [dni],
        row_to_record,
    )
    .optional()
    .map_err(|e| store_err("students.find", Some(dni), e))
}

pub fn get(conn: &Connection, dni: &str) -> AppResult<StudentRecord> {
    find(conn, dni)?.ok_or_else(|| AppError::NotFound(format!("no student with dni {dni}")))
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub dni_filter: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPage {
    pub students: Vec<StudentRecord>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

pub fn list(conn: &Connection, q: &ListQuery) -> AppResult<StudentPage> {
    let page_size = q.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(AppError::Validation(format!(
            "pageSize must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    let page = q.page.unwrap_or(1);
    if page == 0 {
        return Err(AppError::Validation("page is 1-based".to_string()));
    }

    // instr() on lower() keeps the filter literal; LIKE would treat % and _ as wildcards.
    let needle = q
        .dni_filter
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default();
    let total: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM students WHERE instr(lower(dni), ?1) > 0",
            [&needle],
            |r| r.get(0),
        )
        .map_err(|e| store_err("students.list", None, e))?;
    let total = total as usize;

    // An offset beyond i64 is past the last page.
    let Some(offset) = (page - 1)
        .checked_mul(page_size)
        .and_then(|o| i64::try_from(o).ok())
    else {
        return Ok(StudentPage {
            students: Vec::new(),
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        });
    };

    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLUMNS} FROM students
             WHERE instr(lower(dni), ?1) > 0
             ORDER BY apellidos, nombres, dni
             LIMIT ?2 OFFSET ?3"
        ))
        .map_err(|e| store_err("students.list", None, e))?;
    let students = stmt
        .query_map((&needle, page_size as i64, offset), row_to_record)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| store_err("students.list", None, e))?;

    Ok(StudentPage {
        students,
        total,
        page,
        page_size,
        total_pages: total.div_ceil(page_size),
    })
}

fn insert_one(conn: &Connection, record: &StudentRecord, now: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO students(
           dni, apellidos, nombres, materia, nota_parcial, recuperatorio,
           porcentaje_asistencia, porcentaje_tp_aprobados, diario_clase, condicion,
           created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            record.dni,
            record.apellidos,
            record.nombres,
            record.materia,
            record.nota_parcial,
            record.recuperatorio,
            record.porcentaje_asistencia,
            record.porcentaje_tp_aprobados,
            record.diario_clase,
            record.condicion,
            now,
            now,
        ],
    )
}

pub fn create(conn: &Connection, dni: &str, fields: StudentFields) -> AppResult<StudentRecord> {
    let dni = validate_dni(dni).map_err(AppError::Validation)?;
    let record = StudentRecord::from_fields(dni, fields);
    let now = now_rfc3339();
    match insert_one(conn, &record, &now) {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            tracing::info!(dni = %record.dni, "create rejected: dni already exists");
            return Err(AppError::DuplicateKey(record.dni));
        }
        Err(e) => return Err(store_err("students.create", Some(&record.dni), e)),
    }
    tracing::info!(dni = %record.dni, "student created");
    get(conn, &record.dni)
}

pub fn update(conn: &Connection, dni: &str, fields: StudentFields) -> AppResult<StudentRecord> {
    let changed = conn
        .execute(
            "UPDATE students SET
               apellidos = ?, nombres = ?, materia = ?, nota_parcial = ?, recuperatorio = ?,
               porcentaje_asistencia = ?, porcentaje_tp_aprobados = ?, diario_clase = ?,
               condicion = ?, updated_at = ?
             WHERE dni = ?",
            rusqlite::params![
                fields.apellidos,
                fields.nombres,
                fields.materia,
                fields.nota_parcial,
                fields.recuperatorio,
                fields.porcentaje_asistencia,
                fields.porcentaje_tp_aprobados,
                fields.diario_clase,
                fields.condicion,
                now_rfc3339(),
                dni,
            ],
        )
        .map_err(|e| store_err("students.update", Some(dni), e))?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("no student with dni {dni}")));
    }
    tracing::info!(dni, "student updated");
    get(conn, dni)
}

pub fn delete(conn: &Connection, dni: &str) -> AppResult<()> {
    let changed = conn
        .execute("DELETE FROM students WHERE dni = ?", [dni])
        .map_err(|e| store_err("students.delete", Some(dni), e))?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("no student with dni {dni}")));
    }
    tracing::info!(dni, "student deleted");
    Ok(())
}

/// Removes every student record. There is no undo.
pub fn delete_all(conn: &Connection) -> AppResult<usize> {
    let n = conn
        .execute("DELETE FROM students", [])
        .map_err(|e| store_err("students.deleteAll", None, e))?;
    tracing::warn!(deleted = n, "all student records deleted");
    Ok(n)
}

/// One query for the whole batch: which of these DNIs are already stored.
pub fn existing_dnis(conn: &Connection, dnis: &[String]) -> AppResult<HashSet<String>> {
    if dnis.is_empty() {
        return Ok(HashSet::new());
    }
    let placeholders = vec!["?"; dnis.len()].join(",");
    let sql = format!("SELECT dni FROM students WHERE dni IN ({placeholders})");
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| store_err("students.existing", None, e))?;
    stmt.query_map(params_from_iter(dnis.iter()), |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<HashSet<_>, _>>())
        .map_err(|e| store_err("students.existing", None, e))
}

#[derive(Debug)]
pub enum BatchInsertError {
    Duplicate(String),
    Store(AppError),
}

/// Inserts all records in one transaction; any failure leaves the table untouched.
pub fn insert_batch(conn: &Connection, records: &[StudentRecord]) -> Result<usize, BatchInsertError> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| BatchInsertError::Store(store_err("students.import", None, e)))?;
    let now = now_rfc3339();
    for record in records {
        if let Err(e) = insert_one(&tx, record, &now) {
            if is_unique_violation(&e) {
                tracing::warn!(dni = %record.dni, error = %e, "bulk insert hit a duplicate dni; rolling back");
                return Err(BatchInsertError::Duplicate(e.to_string()));
            }
            return Err(BatchInsertError::Store(store_err(
                "students.import",
                Some(&record.dni),
                e,
            )));
        }
    }
    tx.commit()
        .map_err(|e| BatchInsertError::Store(store_err("students.import", None, e)))?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Score;

    fn conn() -> Connection {
        let c = Connection::open_in_memory().expect("open");
        crate::db::init_schema(&c).expect("schema");
        c
    }

    fn fields(apellidos: &str) -> StudentFields {
        StudentFields {
            apellidos: apellidos.into(),
            nombres: "Ana".into(),
            materia: "Historia".into(),
            nota_parcial: Some(Score::Decimal(7.5)),
            recuperatorio: Some(Score::Text("Ausente".into())),
            porcentaje_asistencia: Some(80),
            porcentaje_tp_aprobados: None,
            diario_clase: None,
            condicion: "REGULAR".into(),
        }
    }

    #[test]
    fn create_get_and_duplicate() {
        let c = conn();
        let r = create(&c, " 30111222 ", fields("Diaz")).expect("create");
        assert_eq!(r.dni, "30111222");
        assert_eq!(r.nota_parcial, Some(Score::Decimal(7.5)));
        assert_eq!(r.recuperatorio, Some(Score::Text("Ausente".into())));
        assert!(r.created_at.is_some());

        let dup = create(&c, "30111222", fields("Otro")).expect_err("duplicate");
        assert!(matches!(dup, AppError::DuplicateKey(ref d) if d == "30111222"));
    }

    #[test]
    fn update_and_delete_missing_targets_are_not_found() {
        let c = conn();
        assert!(matches!(update(&c, "99999", fields("X")), Err(AppError::NotFound(_))));
        assert!(matches!(delete(&c, "99999"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn update_keeps_dni_and_refreshes_fields() {
        let c = conn();
        create(&c, "30111222", fields("Diaz")).expect("create");
        let mut f = fields("Diaz");
        f.condicion = "LIBRE".into();
        f.nota_parcial = None;
        let r = update(&c, "30111222", f).expect("update");
        assert_eq!(r.dni, "30111222");
        assert_eq!(r.condicion, "LIBRE");
        assert_eq!(r.nota_parcial, None);
    }

    #[test]
    fn list_filters_sorts_and_pages() {
        let c = conn();
        create(&c, "30000001", fields("Zapata")).expect("create");
        create(&c, "30000002", fields("Acosta")).expect("create");
        create(&c, "41000003", fields("Medina")).expect("create");

        let all = list(&c, &ListQuery::default()).expect("list");
        assert_eq!(all.total, 3);
        let names: Vec<_> = all.students.iter().map(|s| s.apellidos.as_str()).collect();
        assert_eq!(names, vec!["Acosta", "Medina", "Zapata"]);

        let filtered = list(
            &c,
            &ListQuery {
                dni_filter: Some("300".into()),
                page: Some(2),
                page_size: Some(1),
            },
        )
        .expect("list");
        assert_eq!(filtered.total, 2);
        assert_eq!(filtered.total_pages, 2);
        assert_eq!(filtered.students.len(), 1);
        assert_eq!(filtered.students[0].apellidos, "Zapata");

        assert!(list(
            &c,
            &ListQuery {
                page_size: Some(0),
                ..Default::default()
            }
        )
        .is_err());
    }

    #[test]
    fn huge_page_number_is_an_empty_page() {
        let c = conn();
        create(&c, "30000001", fields("Zapata")).expect("create");

        for page in [usize::MAX, usize::MAX / 2, (i64::MAX as usize) / 500 + 2] {
            let res = list(
                &c,
                &ListQuery {
                    page: Some(page),
                    page_size: Some(500),
                    ..Default::default()
                },
            )
            .expect("list");
            assert_eq!(res.total, 1);
            assert_eq!(res.total_pages, 1);
            assert_eq!(res.page, page);
            assert!(res.students.is_empty());
        }
    }

    #[test]
    fn delete_all_reports_count() {
        let c = conn();
        create(&c, "30000001", fields("A")).expect("create");
        create(&c, "30000002", fields("B")).expect("create");
        assert_eq!(delete_all(&c).expect("delete all"), 2);
        assert_eq!(list(&c, &ListQuery::default()).expect("list").total, 0);
    }

    #[test]
    fn batch_insert_rolls_back_on_duplicate() {
        let c = conn();
        let a = StudentRecord::from_fields("555".into(), fields("A"));
        let b = StudentRecord::from_fields("556".into(), fields("B"));
        let res = insert_batch(&c, &[a.clone(), b, a]);
        assert!(matches!(res, Err(BatchInsertError::Duplicate(_))));
        assert_eq!(list(&c, &ListQuery::default()).expect("list").total, 0);

        let existing = existing_dnis(&c, &["555".to_string()]).expect("existing");
        assert!(existing.is_empty());
    }
}
