use thiserror::Error;

/// Errors surfaced by the query engine and HTTP layer.
///
/// The indexing pipeline itself reports failures through `anyhow`; this enum
/// exists where the HTTP layer needs to map failures onto status codes.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A referenced id does not exist in the index.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed id, invalid filter JSON, or missing required parameter.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Wrong HTTP method for the endpoint.
    #[error("method not allowed")]
    Unsupported,

    /// SSA rebuild or function lookup failure during a CFG query.
    #[error("analysis failed: {0}")]
    Analysis(String),

    /// I/O or transactional failure on the relational store.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;
