use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("deletion queue is full")]
    QueueFull,

    #[error("deletion batcher is shut down")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid short id: {0}")]
    InvalidShortId(#[from] urlc_types::TypeError),

    #[error("short id error: {0}")]
    Id(#[from] urlc_id::IdError),

    #[error("store error: {0}")]
    Store(#[from] urlc_store::StoreError),

    #[error("deletion error: {0}")]
    Batch(#[from] BatchError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
