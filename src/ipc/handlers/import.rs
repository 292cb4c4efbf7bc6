use crate::import::{import_batch, parse_csv};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::admin_db;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn read_csv_text(params: &Value) -> Result<String, HandlerErr> {
    if let Some(text) = params.get("csvText").and_then(|v| v.as_str()) {
        return Ok(text.to_string());
    }
    let Some(in_path) = params.get("inPath").and_then(|v| v.as_str()) else {
        return Err(HandlerErr::bad_params("provide csvText or inPath"));
    };
    std::fs::read_to_string(in_path).map_err(|e| {
        tracing::warn!(path = in_path, error = %e, "could not read import file");
        HandlerErr {
            code: "parse_failed",
            message: e.to_string(),
            details: Some(json!({ "path": in_path })),
        }
    })
}

fn handle_import_csv(state: &mut AppState, req: &Request) -> Value {
    let conn = match admin_db(state, &req.params) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let text = match read_csv_text(&req.params) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    let rows = match parse_csv(&text) {
        Ok(r) => r,
        Err(e) => return HandlerErr::from(e).response(&req.id),
    };

    let mut report = import_batch(conn, rows);
    match report.error.take() {
        None => {
            tracing::info!(inserted = report.inserted_count, "csv import finished");
            ok(&req.id, json!(report))
        }
        Some(e) => {
            tracing::warn!(code = e.code(), error = %e, "csv import failed");
            err(&req.id, e.code(), e.user_message(), Some(json!(report)))
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.importCsv" => Some(handle_import_csv(state, req)),
        _ => None,
    }
}
