use thiserror::Error;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("malformed index metadata: {0}")]
    MalformedMetadata(String),

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("url does not name an index: {0}")]
    MissingIndex(String),

    #[error("target already exists: {0}")]
    AlreadyExists(String),
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error("batch channel closed while records were still being sent")]
    ChannelClosed,

    #[error("extraction failed: {0}")]
    Extraction(Box<TransferError>),

    #[error("worker task failed: {0}")]
    WorkerPanicked(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<tokio::task::JoinError> for TransferError {
    fn from(error: tokio::task::JoinError) -> Self {
        TransferError::WorkerPanicked(error.to_string())
    }
}

pub type Result<T, E = TransferError> = std::result::Result<T, E>;
