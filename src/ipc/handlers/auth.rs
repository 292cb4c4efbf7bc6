use crate::auth::LoginError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn handle_login(state: &mut AppState, req: &Request) -> Value {
    let username = req.params.get("username").and_then(|v| v.as_str());
    let password = req.params.get("password").and_then(|v| v.as_str());
    let (Some(username), Some(password)) = (username, password) else {
        return err(&req.id, "bad_params", "username and password are required", None);
    };

    match state.sessions.login(&state.config, username, password) {
        Ok((session, cookie)) => ok(
            &req.id,
            json!({
                "token": session.token,
                "expiresAt": session.expires_at.to_rfc3339(),
                "cookie": cookie,
            }),
        ),
        Err(LoginError::NotConfigured) => {
            tracing::error!("login attempted but no admin credentials are configured");
            err(
                &req.id,
                "auth_not_configured",
                "admin login is disabled: set GRADELOOKUP_ADMIN_USER and GRADELOOKUP_ADMIN_PASSWORD",
                None,
            )
        }
        Err(LoginError::SessionLifetime(days)) => err(
            &req.id,
            "auth_not_configured",
            format!("admin login is disabled: GRADELOOKUP_SESSION_DAYS={days} is out of range"),
            None,
        ),
        Err(LoginError::BadCredentials) => err(
            &req.id,
            "unauthorized",
            "incorrect username or password",
            None,
        ),
    }
}

fn handle_logout(state: &mut AppState, req: &Request) -> Value {
    let token = req.params.get("token").and_then(|v| v.as_str());
    let cookie = state.sessions.logout(&state.config, token);
    ok(&req.id, json!({ "cookie": cookie, "redirect": "/login" }))
}

fn handle_check(state: &mut AppState, req: &Request) -> Value {
    let session = req
        .params
        .get("token")
        .and_then(|v| v.as_str())
        .and_then(|t| state.sessions.validate(t));
    ok(
        &req.id,
        json!({
            "authenticated": session.is_some(),
            "expiresAt": session.map(|s| s.expires_at.to_rfc3339()),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        "auth.check" => Some(handle_check(state, req)),
        _ => None,
    }
}
