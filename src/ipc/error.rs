use crate::error::AppError;
use crate::import::EXPECTED_COLUMNS;
use serde_json::{json, Value};

pub fn ok(id: &str, result: Value) -> Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<AppError> for HandlerErr {
    fn from(e: AppError) -> Self {
        let details = match &e {
            AppError::Store { op, .. } => Some(json!({ "operation": op })),
            AppError::MissingColumns(cols) => Some(json!({
                "missingColumns": cols,
                "expectedColumns": EXPECTED_COLUMNS,
            })),
            _ => None,
        };
        Self {
            code: e.code(),
            message: e.user_message(),
            details,
        }
    }
}
