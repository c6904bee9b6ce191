use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user is inactive")]
    UserInactive,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication backend error: {0}")]
    AuthenticationBackend(String),

    #[error("entity is not active")]
    NotActive,

    #[error("entity is already active")]
    AlreadyActive,

    #[error("unauthorized")]
    Unauthorized,

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

pub type Result<T> = std::result::Result<T, Error>;
