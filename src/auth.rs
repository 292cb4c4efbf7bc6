use crate::config::{sha256, AdminCredentials, Config};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

pub const COOKIE_NAME: &str = "admin-auth";

#[derive(Debug, PartialEq, Eq)]
pub enum LoginError {
    NotConfigured,
    BadCredentials,
    /// `session_days` does not fit a timestamp.
    SessionLifetime(i64),
}

/// What the web layer needs to set (or clear) the admin cookie.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieSpec {
    pub name: &'static str,
    pub value: String,
    pub path: &'static str,
    pub http_only: bool,
    pub same_site: &'static str,
    pub secure: bool,
    pub max_age: i64,
    pub set_cookie: String,
}

impl CookieSpec {
    fn new(value: String, max_age: i64, secure: bool) -> Self {
        let mut header =
            format!("{COOKIE_NAME}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax");
        if secure {
            header.push_str("; Secure");
        }
        Self {
            name: COOKIE_NAME,
            value,
            path: "/",
            http_only: true,
            same_site: "Lax",
            secure,
            max_age,
            set_cookie: header,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

/// Server-side admin sessions. Lives only as long as the process.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
}

fn digests_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn credentials_match(admin: &AdminCredentials, username: &str, password: &str) -> bool {
    let user_ok = digests_match(&sha256(username.as_bytes()), &sha256(admin.username.as_bytes()));
    let pass_ok = digests_match(&sha256(password.as_bytes()), &admin.password_digest);
    user_ok & pass_ok
}

impl SessionStore {
    pub fn login(
        &mut self,
        config: &Config,
        username: &str,
        password: &str,
    ) -> Result<(Session, CookieSpec), LoginError> {
        let Some(admin) = config.admin.as_ref() else {
            return Err(LoginError::NotConfigured);
        };
        if !credentials_match(admin, username, password) {
            tracing::warn!("admin login rejected");
            return Err(LoginError::BadCredentials);
        }

        let now = Utc::now();
        let Some((ttl, expires_at)) = Duration::try_days(config.session_days)
            .and_then(|ttl| now.checked_add_signed(ttl).map(|at| (ttl, at)))
        else {
            tracing::error!(session_days = config.session_days, "session lifetime out of range");
            return Err(LoginError::SessionLifetime(config.session_days));
        };

        self.purge_expired(now);
        let session = Session {
            token: Uuid::new_v4().to_string(),
            username: admin.username.clone(),
            expires_at,
        };
        self.sessions.insert(session.token.clone(), session.clone());
        tracing::info!(username = %session.username, "admin logged in");
        let cookie = CookieSpec::new(session.token.clone(), ttl.num_seconds(), config.production);
        Ok((session, cookie))
    }

    pub fn logout(&mut self, config: &Config, token: Option<&str>) -> CookieSpec {
        if let Some(t) = token {
            if self.sessions.remove(t).is_some() {
                tracing::info!("admin logged out");
            }
        }
        CookieSpec::new(String::new(), 0, config.production)
    }

    pub fn validate(&self, token: &str) -> Option<&Session> {
        self.validate_at(token, Utc::now())
    }

    fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Option<&Session> {
        self.sessions.get(token).filter(|s| s.expires_at > now)
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.sessions.retain(|_, s| s.expires_at > now);
    }
}
