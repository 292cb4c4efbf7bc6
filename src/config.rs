use sha2::{Digest, Sha256};
use std::path::PathBuf;

pub const DEFAULT_SESSION_DAYS: i64 = 7;
pub const MAX_SESSION_DAYS: i64 = 3650;

/// Admin credential pair. The password is kept only as a SHA-256 digest.
#[derive(Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password_digest: [u8; 32],
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password_digest", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub admin: Option<AdminCredentials>,
    pub production: bool,
    pub session_days: i64,
    pub workspace: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admin: None,
            production: false,
            session_days: DEFAULT_SESSION_DAYS,
            workspace: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let admin = match get("GRADELOOKUP_ADMIN_USER") {
            None => None,
            Some(username) => {
                let password_digest = if let Some(hex) = get("GRADELOOKUP_ADMIN_PASSWORD_SHA256") {
                    parse_hex_digest(&hex).ok_or_else(|| {
                        anyhow::anyhow!("GRADELOOKUP_ADMIN_PASSWORD_SHA256 must be 64 hex characters")
                    })?
                } else if let Some(password) = lookup("GRADELOOKUP_ADMIN_PASSWORD") {
                    sha256(password.as_bytes())
                } else {
                    anyhow::bail!(
                        "GRADELOOKUP_ADMIN_USER is set but neither GRADELOOKUP_ADMIN_PASSWORD nor GRADELOOKUP_ADMIN_PASSWORD_SHA256 is"
                    );
                };
                Some(AdminCredentials {
                    username,
                    password_digest,
                })
            }
        };

        let production = get("GRADELOOKUP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let session_days = match get("GRADELOOKUP_SESSION_DAYS") {
            None => DEFAULT_SESSION_DAYS,
            Some(raw) => match raw.parse::<i64>() {
                Ok(n) if (1..=MAX_SESSION_DAYS).contains(&n) => n,
                _ => anyhow::bail!(
                    "GRADELOOKUP_SESSION_DAYS must be an integer between 1 and {MAX_SESSION_DAYS}, got {raw:?}"
                ),
            },
        };

        Ok(Self {
            admin,
            production,
            session_days,
            workspace: get("GRADELOOKUP_WORKSPACE").map(PathBuf::from),
        })
    }
}

pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

fn parse_hex_digest(s: &str) -> Option<[u8; 32]> {
    if s.len() != 64 || !s.is_ascii() {
        return None;
    }
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}
