use crate::error::{AppError, AppResult};
use crate::students;
use crate::visibility::{self, filter_record, FilteredGradeView};
use rusqlite::Connection;

/// Public grade lookup by DNI.
///
/// Absent record → `NotFound`. A record whose every field is hidden by an
/// explicitly loaded configuration → `NoVisibleFields`. When the settings
/// cannot be read the lookup fails open and shows every field.
pub fn lookup(conn: &Connection, dni: &str) -> AppResult<FilteredGradeView> {
    let dni = dni.trim();
    if dni.is_empty() {
        return Err(AppError::Validation("dni must not be empty".to_string()));
    }

    let Some(record) = students::find(conn, dni)? else {
        tracing::info!(dni, "lookup: no record");
        return Err(AppError::NotFound(format!(
            "no data found for dni {dni}; check the number and try again"
        )));
    };

    let (map, loaded) = visibility::effective_map(conn);
    let view = filter_record(&record, &map);
    if view.is_empty() && loaded {
        tracing::warn!(dni, "lookup: every field is hidden by the visibility settings");
        return Err(AppError::NoVisibleFields(dni.to_string()));
    }
    tracing::debug!(dni, fields = view.len(), "lookup served");
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StudentFields;
    use crate::visibility::PublicField;

    fn seeded() -> Connection {
        let c = Connection::open_in_memory().expect("open");
        crate::db::init_schema(&c).expect("schema");
        let fields = StudentFields {
            apellidos: "Diaz".into(),
            nombres: "Ana".into(),
            materia: "Historia".into(),
            nota_parcial: None,
            recuperatorio: None,
            porcentaje_asistencia: None,
            porcentaje_tp_aprobados: None,
            diario_clase: None,
            condicion: "REGULAR".into(),
        };
        students::create(&c, "30111222", fields).expect("create");
        c
    }

    #[test]
    fn blank_dni_is_a_validation_error() {
        let c = seeded();
        assert!(matches!(lookup(&c, "   "), Err(AppError::Validation(_))));
    }

    #[test]
    fn absent_and_all_hidden_are_distinct() {
        let c = seeded();
        assert!(matches!(lookup(&c, "40000000"), Err(AppError::NotFound(_))));

        c.execute("UPDATE visibility_settings SET is_visible = 0", [])
            .expect("hide all");
        assert!(matches!(
            lookup(&c, "30111222"),
            Err(AppError::NoVisibleFields(_))
        ));
    }

    #[test]
    fn hidden_field_is_dropped() {
        let c = seeded();
        visibility::update_setting(&c, "condicion", false).expect("hide");
        let view = lookup(&c, " 30111222 ").expect("lookup");
        assert!(!view.contains(PublicField::Condicion));
        assert_eq!(
            view.get(PublicField::StudentName),
            Some(&serde_json::json!("Diaz Ana"))
        );
    }

    #[test]
    fn unreachable_store_is_not_reported_as_missing() {
        let c = seeded();
        c.execute("DROP TABLE students", []).expect("drop");
        match lookup(&c, "30111222") {
            Err(e @ AppError::Store { op: "students.find", .. }) => {
                assert_eq!(e.code(), "store_error");
                assert!(!e.user_message().contains("no such table"));
            }
            other => panic!("expected a store error, got {other:?}"),
        }
    }

    #[test]
    fn empty_or_missing_settings_show_everything() {
        let c = seeded();
        c.execute("DELETE FROM visibility_settings", []).expect("clear");
        assert_eq!(lookup(&c, "30111222").expect("lookup").len(), PublicField::ALL.len());

        c.execute("DROP TABLE visibility_settings", []).expect("drop");
        assert_eq!(lookup(&c, "30111222").expect("lookup").len(), PublicField::ALL.len());
    }
}
