use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DNI_MIN_LEN: usize = 5;
pub const DNI_MAX_LEN: usize = 15;

/// A grade as entered by staff: free text ("Ausente", "7,50") or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Score {
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl ToSql for Score {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Score::Integer(v) => v.to_sql(),
            Score::Decimal(v) => v.to_sql(),
            Score::Text(v) => v.to_sql(),
        }
    }
}

impl FromSql for Score {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(v) => Ok(Score::Integer(v)),
            ValueRef::Real(v) => Ok(Score::Decimal(v)),
            ValueRef::Text(_) => String::column_result(value).map(Score::Text),
            _ => Err(rusqlite::types::FromSqlError::InvalidType),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub dni: String,
    pub apellidos: String,
    pub nombres: String,
    pub materia: String,
    pub nota_parcial: Option<Score>,
    pub recuperatorio: Option<Score>,
    pub porcentaje_asistencia: Option<i64>,
    pub porcentaje_tp_aprobados: Option<i64>,
    pub diario_clase: Option<String>,
    pub condicion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl StudentRecord {
    /// "Apellidos Nombres", trimmed, single space between the parts.
    pub fn student_name(&self) -> String {
        format!("{} {}", self.apellidos, self.nombres).trim().to_string()
    }

    /// Builds a record from its editable fields; timestamps are set by the store.
    pub fn from_fields(dni: String, fields: StudentFields) -> Self {
        Self {
            dni,
            apellidos: fields.apellidos,
            nombres: fields.nombres,
            materia: fields.materia,
            nota_parcial: fields.nota_parcial,
            recuperatorio: fields.recuperatorio,
            porcentaje_asistencia: fields.porcentaje_asistencia,
            porcentaje_tp_aprobados: fields.porcentaje_tp_aprobados,
            diario_clase: fields.diario_clase,
            condicion: fields.condicion,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Everything an admin may edit on a record. The DNI is never part of this.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentFields {
    pub apellidos: String,
    pub nombres: String,
    pub materia: String,
    pub nota_parcial: Option<Score>,
    pub recuperatorio: Option<Score>,
    pub porcentaje_asistencia: Option<i64>,
    pub porcentaje_tp_aprobados: Option<i64>,
    pub diario_clase: Option<String>,
    pub condicion: String,
}

impl StudentFields {
    /// Coerces a JSON object from the admin forms into validated fields.
    pub fn from_json(obj: &serde_json::Map<String, Value>) -> Result<Self, String> {
        Ok(Self {
            apellidos: required_text(obj, "apellidos")?,
            nombres: required_text(obj, "nombres")?,
            materia: required_text(obj, "materia")?,
            nota_parcial: nullable_score(obj, "nota_parcial")?,
            recuperatorio: nullable_score(obj, "recuperatorio")?,
            porcentaje_asistencia: nullable_percentage(obj, "porcentaje_asistencia")?,
            porcentaje_tp_aprobados: nullable_percentage(obj, "porcentaje_tp_aprobados")?,
            diario_clase: nullable_text(obj, "diario_clase")?,
            condicion: required_text(obj, "condicion")?,
        })
    }
}

pub fn validate_dni(raw: &str) -> Result<String, String> {
    let dni = raw.trim();
    let len = dni.chars().count();
    if len < DNI_MIN_LEN {
        return Err(format!("dni must have at least {DNI_MIN_LEN} characters"));
    }
    if len > DNI_MAX_LEN {
        return Err(format!("dni must not exceed {DNI_MAX_LEN} characters"));
    }
    Ok(dni.to_string())
}

fn required_text(obj: &serde_json::Map<String, Value>, key: &str) -> Result<String, String> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) | Some(Value::Null) | None => Err(format!("{key} is required")),
        Some(_) => Err(format!("{key} must be a string")),
    }
}

fn nullable_text(obj: &serde_json::Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("{key} must be a string or null")),
    }
}

fn nullable_score(obj: &serde_json::Map<String, Value>, key: &str) -> Result<Option<Score>, String> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(Score::Text(s.clone()))),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(Some(Score::Integer(i))),
            None => n
                .as_f64()
                .map(|f| Some(Score::Decimal(f)))
                .ok_or_else(|| format!("{key} is not a representable number")),
        },
        Some(_) => Err(format!("{key} must be a string, number or null")),
    }
}

fn nullable_percentage(
    obj: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<i64>, String> {
    let n = match obj.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("{key} must be an integer between 0 and 100"))?,
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| format!("{key} must be an integer between 0 and 100"))?,
        Some(_) => return Err(format!("{key} must be an integer between 0 and 100")),
    };
    if !(0..=100).contains(&n) {
        return Err(format!("{key} must be an integer between 0 and 100"));
    }
    Ok(Some(n))
}

/// Stored visibility row, as shown on the admin settings screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilitySetting {
    pub field_name: String,
    pub is_visible: bool,
    pub label: String,
    pub updated_at: Option<String>,
}
