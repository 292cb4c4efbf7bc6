use super::error::HandlerErr;
use super::types::AppState;
use rusqlite::Connection;
use serde_json::Value;

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_usize(params: &Value, key: &str) -> Result<Option<usize>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a non-negative integer", key))),
    }
}

pub fn db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state.db.as_ref().ok_or_else(|| HandlerErr {
        code: "no_workspace",
        message: "select a workspace first".to_string(),
        details: None,
    })
}

/// Admin gate: params.token must name a live session.
pub fn require_admin(state: &AppState, params: &Value) -> Result<(), HandlerErr> {
    let token = params.get("token").and_then(|v| v.as_str()).unwrap_or("");
    if token.is_empty() || state.sessions.validate(token).is_none() {
        tracing::info!("admin request without a valid session");
        return Err(HandlerErr {
            code: "unauthorized",
            message: "login required".to_string(),
            details: Some(serde_json::json!({ "redirect": "/login" })),
        });
    }
    Ok(())
}

/// Gate plus workspace, the preamble of every admin handler.
pub fn admin_db<'a>(state: &'a AppState, params: &Value) -> Result<&'a Connection, HandlerErr> {
    require_admin(state, params)?;
    db(state)
}
