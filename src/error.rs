use thiserror::Error;

/// Errors raised inside the cluster core.
///
/// None of these escape the public storage operations: transport and codec
/// failures are logged at the boundary and reported as `false`/`None`.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Underlying socket failure.
    #[error("cluster transport error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON on the wire or in an atom payload.
    #[error("cluster serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Gzip or base64 failure while handling a compressed atom payload.
    #[error("atom payload compression error: {0}")]
    Compression(String),
    /// Peer did not answer within the request timeout.
    #[error("request to {0} timed out")]
    Timeout(String),
    /// Connection closed before a response line arrived.
    #[error("peer {0} closed the connection without responding")]
    NoResponse(String),
    /// Node id is not present in the membership table.
    #[error("node '{0}' is not a known cluster member")]
    UnknownNode(String),
    /// Peer answered with an explicit rejection.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// Peer answered with a status that does not fit the request.
    #[error("unexpected response status '{0}'")]
    UnexpectedResponse(String),
    /// Invalid or unreadable configuration.
    #[error("cluster configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, ClusterError>;
