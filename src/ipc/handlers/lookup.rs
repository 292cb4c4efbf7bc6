use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::db;
use crate::ipc::types::{AppState, Request};
use crate::lookup::lookup;
use serde_json::{json, Value};

fn handle_grades_lookup(state: &mut AppState, req: &Request) -> Value {
    let conn = match db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let Some(dni) = req.params.get("dni").and_then(|v| v.as_str()) else {
        return HandlerErr::bad_params("missing dni").response(&req.id);
    };
    match lookup(conn, dni) {
        Ok(view) => ok(&req.id, json!({ "data": view })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "grades.lookup" => Some(handle_grades_lookup(state, req)),
        _ => None,
    }
}
