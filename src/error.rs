use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("a student with dni {0} already exists")]
    DuplicateKey(String),

    #[error("no visible fields are configured for dni {0}; contact the administrator")]
    NoVisibleFields(String),

    #[error("missing CSV columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("{0}")]
    ConfigMissing(String),

    #[error("store error during {op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn store(op: &'static str, source: rusqlite::Error) -> Self {
        AppError::Store { op, source }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "bad_params",
            AppError::NotFound(_) => "not_found",
            AppError::DuplicateKey(_) => "duplicate_key",
            AppError::NoVisibleFields(_) => "no_visible_fields",
            AppError::MissingColumns(_) => "missing_columns",
            AppError::ConfigMissing(_) => "config_missing",
            AppError::Store { .. } => "store_error",
        }
    }

    /// Text safe to show to an end user. Store errors never expose the raw SQLite message.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Store { .. } => {
                "the grade database could not be reached; try again later".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation
                && (f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
    )
}

pub fn is_missing_table(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("no such table"))
}
