use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("A wire can't link two sockets on the same node ({0})")]
    SameNode(String),

    #[error("Sockets {0} and {1} can't be connected: one must be an input and one an output")]
    IncompatibleSockets(String, String),

    #[error("Dangling id: {0}")]
    DanglingId(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),
}

impl GraphError {
    pub(crate) fn malformed(what: impl Into<String>) -> Self {
        GraphError::MalformedDocument(what.into())
    }
}
