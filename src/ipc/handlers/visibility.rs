use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{admin_db, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::visibility;
use serde_json::{json, Value};

fn handle_visibility_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = admin_db(state, &req.params)?;
    let settings = visibility::load_settings(conn)?;
    Ok(json!({ "data": settings }))
}

fn handle_visibility_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = admin_db(state, &req.params)?;
    let field_name = get_required_str(&req.params, "fieldName")?;
    let is_visible = req
        .params
        .get("isVisible")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params("isVisible must be a boolean"))?;
    let setting = visibility::update_setting(conn, &field_name, is_visible)?;
    tracing::info!(field = %field_name, is_visible, "visibility updated");
    Ok(json!({ "data": setting }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let res = match req.method.as_str() {
        "visibility.list" => handle_visibility_list(state, req),
        "visibility.update" => handle_visibility_update(state, req),
        _ => return None,
    };
    Some(match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
