use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{admin_db, get_optional_usize, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::StudentFields;
use crate::students::{self, ListQuery};
use serde_json::{json, Value};

fn fields_param(params: &Value, key: &str) -> Result<StudentFields, HandlerErr> {
    let Some(obj) = params.get(key).and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params(format!("{} must be an object", key)));
    };
    StudentFields::from_json(obj).map_err(HandlerErr::bad_params)
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = admin_db(state, &req.params)?;
    let query = ListQuery {
        dni_filter: req
            .params
            .get("dniFilter")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        page: get_optional_usize(&req.params, "page")?,
        page_size: get_optional_usize(&req.params, "pageSize")?,
    };
    let page = students::list(conn, &query)?;
    Ok(json!(page))
}

fn handle_students_get(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = admin_db(state, &req.params)?;
    let dni = get_required_str(&req.params, "dni")?;
    let student = students::get(conn, &dni)?;
    Ok(json!({ "student": student }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = admin_db(state, &req.params)?;
    let Some(student) = req.params.get("student").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("student must be an object"));
    };
    let dni = student
        .get("dni")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("dni is required"))?;
    let fields = StudentFields::from_json(student).map_err(HandlerErr::bad_params)?;
    let created = students::create(conn, dni, fields)?;
    Ok(json!({ "student": created }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = admin_db(state, &req.params)?;
    let dni = get_required_str(&req.params, "dni")?;
    let fields = fields_param(&req.params, "patch")?;
    let updated = students::update(conn, &dni, fields)?;
    Ok(json!({ "student": updated }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = admin_db(state, &req.params)?;
    let dni = get_required_str(&req.params, "dni")?;
    students::delete(conn, &dni)?;
    Ok(json!({ "deleted": dni }))
}

fn handle_students_delete_all(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = admin_db(state, &req.params)?;
    if req.params.get("confirm").and_then(|v| v.as_bool()) != Some(true) {
        return Err(HandlerErr::bad_params(
            "deleting every student is irreversible; pass confirm: true",
        ));
    }
    let n = students::delete_all(conn)?;
    Ok(json!({ "deleted": n }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let res = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.get" => handle_students_get(state, req),
        "students.create" => handle_students_create(state, req),
        "students.update" => handle_students_update(state, req),
        "students.delete" => handle_students_delete(state, req),
        "students.deleteAll" => handle_students_delete_all(state, req),
        _ => return None,
    };
    Some(match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
