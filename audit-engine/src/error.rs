use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit storage error: {0}")]
    StorageError(String),

    #[error("Unknown audit action: {0}")]
    UnknownAction(String),

    #[error("Unknown actor type: {0}")]
    UnknownActorType(String),
}

pub type Result<T> = std::result::Result<T, AuditError>;
