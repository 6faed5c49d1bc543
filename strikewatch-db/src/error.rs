use thiserror::Error;
use tokio_rusqlite::rusqlite;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error("server `{0}` is already in the saved list")]
    ServerAlreadySaved(String),

    #[error("no saved server at position {0}")]
    ServerNotFound(usize),
}

pub type Result<T> = std::result::Result<T, DbError>;
