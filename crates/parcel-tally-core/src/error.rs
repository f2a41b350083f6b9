use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn session_not_found(id: i64) -> Self {
        Error::NotFound {
            entity: "session",
            id,
        }
    }

    pub fn item_not_found(id: i64) -> Self {
        Error::NotFound { entity: "item", id }
    }

    /// HTTP-equivalent status for callers exposing the engine over a transport.
    /// Invariant violations surface as a generic server error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(Error::session_not_found(7).status_code(), 404);
        assert_eq!(Error::Validation("empty".into()).status_code(), 400);
        assert_eq!(
            Error::InvariantViolation("negative missing".into()).status_code(),
            500
        );
        assert_eq!(Error::Other("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(Error::item_not_found(42).to_string(), "item 42 not found");
    }
}
