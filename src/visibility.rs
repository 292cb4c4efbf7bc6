use crate::error::{is_missing_table, AppError, AppResult};
use crate::model::{StudentRecord, VisibilitySetting};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

/// Fields a student may see on the public lookup. The admin toggles each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PublicField {
    #[serde(rename = "studentName")]
    StudentName,
    #[serde(rename = "dni")]
    Dni,
    #[serde(rename = "subject")]
    Subject,
    #[serde(rename = "partialGrade")]
    PartialGrade,
    #[serde(rename = "recuperatorio")]
    Recuperatorio,
    #[serde(rename = "porcentaje_asistencia")]
    PorcentajeAsistencia,
    #[serde(rename = "porcentaje_tp_aprobados")]
    PorcentajeTpAprobados,
    #[serde(rename = "diario_clase")]
    DiarioClase,
    #[serde(rename = "condicion")]
    Condicion,
}

impl PublicField {
    pub const ALL: [PublicField; 9] = [
        PublicField::StudentName,
        PublicField::Dni,
        PublicField::Subject,
        PublicField::PartialGrade,
        PublicField::Recuperatorio,
        PublicField::PorcentajeAsistencia,
        PublicField::PorcentajeTpAprobados,
        PublicField::DiarioClase,
        PublicField::Condicion,
    ];

    pub fn key(self) -> &'static str {
        match self {
            PublicField::StudentName => "studentName",
            PublicField::Dni => "dni",
            PublicField::Subject => "subject",
            PublicField::PartialGrade => "partialGrade",
            PublicField::Recuperatorio => "recuperatorio",
            PublicField::PorcentajeAsistencia => "porcentaje_asistencia",
            PublicField::PorcentajeTpAprobados => "porcentaje_tp_aprobados",
            PublicField::DiarioClase => "diario_clase",
            PublicField::Condicion => "condicion",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }

    pub fn default_label(self) -> &'static str {
        match self {
            PublicField::StudentName => "Nombre Completo del Alumno",
            PublicField::Dni => "DNI del Alumno",
            PublicField::Subject => "Materia Cursada",
            PublicField::PartialGrade => "Nota Parcial",
            PublicField::Recuperatorio => "Nota Recuperatorio",
            PublicField::PorcentajeAsistencia => "Porcentaje de Asistencia",
            PublicField::PorcentajeTpAprobados => "Porcentaje de TP Aprobados",
            PublicField::DiarioClase => "Estado del Diario de Clase",
            PublicField::Condicion => "Condición Final",
        }
    }

    fn value_of(self, record: &StudentRecord) -> Value {
        match self {
            PublicField::StudentName => json!(record.student_name()),
            PublicField::Dni => json!(record.dni),
            PublicField::Subject => json!(record.materia),
            PublicField::PartialGrade => json!(record.nota_parcial),
            PublicField::Recuperatorio => json!(record.recuperatorio),
            PublicField::PorcentajeAsistencia => json!(record.porcentaje_asistencia),
            PublicField::PorcentajeTpAprobados => json!(record.porcentaje_tp_aprobados),
            PublicField::DiarioClase => json!(record.diario_clase),
            PublicField::Condicion => json!(record.condicion),
        }
    }
}

/// Field → visible flag. A field without an entry is visible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilityMap(HashMap<PublicField, bool>);

impl VisibilityMap {
    pub fn all_visible() -> Self {
        Self(PublicField::ALL.into_iter().map(|f| (f, true)).collect())
    }

    pub fn set(&mut self, field: PublicField, visible: bool) {
        self.0.insert(field, visible);
    }

    pub fn is_visible(&self, field: PublicField) -> bool {
        self.0.get(&field) != Some(&false)
    }

    /// Drops rows whose field name is not a public field, logging each one.
    pub fn from_settings(settings: &[VisibilitySetting]) -> Self {
        let mut map = Self::default();
        for s in settings {
            match PublicField::from_key(&s.field_name) {
                Some(field) => map.set(field, s.is_visible),
                None => tracing::warn!(
                    field_name = %s.field_name,
                    "ignoring visibility row for unknown field"
                ),
            }
        }
        map
    }
}

impl FromIterator<(PublicField, bool)> for VisibilityMap {
    fn from_iter<I: IntoIterator<Item = (PublicField, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Public projection of a record; hidden fields are absent, visible nulls stay null.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilteredGradeView(BTreeMap<PublicField, Value>);

impl FilteredGradeView {
    #[cfg(test)]
    pub fn get(&self, field: PublicField) -> Option<&Value> {
        self.0.get(&field)
    }

    #[cfg(test)]
    pub fn contains(&self, field: PublicField) -> bool {
        self.0.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn filter_record(record: &StudentRecord, visibility: &VisibilityMap) -> FilteredGradeView {
    FilteredGradeView(
        PublicField::ALL
            .into_iter()
            .filter(|f| visibility.is_visible(*f))
            .map(|f| (f, f.value_of(record)))
            .collect(),
    )
}

fn config_missing(e: rusqlite::Error) -> AppError {
    tracing::error!(error = %e, "visibility_settings table is missing");
    AppError::ConfigMissing(format!(
        "critical: the visibility_settings table does not exist or is not accessible. \
         Re-select the workspace so it is recreated and seeded with every public field. ({e})"
    ))
}

pub fn load_settings(conn: &Connection) -> AppResult<Vec<VisibilitySetting>> {
    let mut stmt = conn
        .prepare(
            "SELECT field_name, is_visible, label, updated_at
             FROM visibility_settings
             ORDER BY sort_order, field_name",
        )
        .map_err(|e| {
            if is_missing_table(&e) {
                return config_missing(e);
            }
            tracing::error!(op = "visibility.load", error = %e, "failed to query visibility settings");
            AppError::store("visibility.load", e)
        })?;
    stmt.query_map([], |r| {
        Ok(VisibilitySetting {
            field_name: r.get(0)?,
            is_visible: r.get::<_, i64>(1)? != 0,
            label: r.get(2)?,
            updated_at: r.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| {
        tracing::error!(op = "visibility.load", error = %e, "failed to read visibility settings");
        AppError::store("visibility.load", e)
    })
}

/// Settings for the public lookup. Any failure, or an empty table, means everything is visible.
pub fn effective_map(conn: &Connection) -> (VisibilityMap, bool) {
    match load_settings(conn) {
        Ok(settings) if !settings.is_empty() => (VisibilityMap::from_settings(&settings), true),
        Ok(_) => {
            tracing::warn!("visibility settings are empty; showing every field");
            (VisibilityMap::all_visible(), false)
        }
        Err(e) => {
            tracing::warn!(error = %e, "visibility settings unavailable; showing every field");
            (VisibilityMap::all_visible(), false)
        }
    }
}

pub fn update_setting(
    conn: &Connection,
    field_name: &str,
    is_visible: bool,
) -> AppResult<VisibilitySetting> {
    let Some(field) = PublicField::from_key(field_name) else {
        return Err(AppError::Validation(format!(
            "unknown field {field_name:?}; expected one of: {}",
            PublicField::ALL.map(|f| f.key()).join(", ")
        )));
    };
    let now = crate::db::now_rfc3339();
    let changed = conn
        .execute(
            "UPDATE visibility_settings SET is_visible = ?, updated_at = ? WHERE field_name = ?",
            (is_visible as i64, &now, field.key()),
        )
        .map_err(|e| {
            if is_missing_table(&e) {
                return config_missing(e);
            }
            tracing::error!(op = "visibility.update", field = field.key(), error = %e, "update failed");
            AppError::store("visibility.update", e)
        })?;
    if changed == 0 {
        return Err(AppError::ConfigMissing(format!(
            "the visibility setting for '{}' does not exist; re-select the workspace so the settings table is seeded",
            field.key()
        )));
    }
    let row = conn
        .query_row(
            "SELECT field_name, is_visible, label, updated_at FROM visibility_settings WHERE field_name = ?",
            [field.key()],
            |r| {
                Ok(VisibilitySetting {
                    field_name: r.get(0)?,
                    is_visible: r.get::<_, i64>(1)? != 0,
                    label: r.get(2)?,
                    updated_at: r.get(3)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::store("visibility.update", e))?;
    row.ok_or_else(|| AppError::NotFound(format!("visibility setting {} not found", field.key())))
}
