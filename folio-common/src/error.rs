//! Common error types for Folio

use thiserror::Error;

/// Common result type for Folio operations
pub type Result<T> = std::result::Result<T, Error>;

/// How a failed message should be handled by the listener.
///
/// Permanent failures go to the dead-letter exchange with full context;
/// temporary failures are retried with bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Permanent,
    Temporary,
}

/// Error types shared across the Folio pipeline
#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed JSON payload: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("document has no top-level source")]
    MissingSource,

    #[error("document has no $schema identifier")]
    MissingSchema,

    #[error("document has no usable classification")]
    MissingClassification,

    #[error("source stamp is missing or not an object")]
    MissingSourceFields,

    #[error("classified array element carries no classification")]
    BadClassification,

    #[error("merge across mismatched documents: {0}")]
    Incoherent(String),

    #[error("merge over an empty document set")]
    EmptyMerge,

    #[error("no history documents for entity immediately after store")]
    EmptyHistory,

    #[error("payload schema '{got}' does not match expected '{expected}'")]
    SchemaMismatch { expected: String, got: String },

    #[error("unroutable content type: {0}")]
    UnknownContentType(String),

    #[error("store operation timed out: {0}")]
    StoreTimeout(&'static str),

    #[error("optimistic version conflict on {0}")]
    StoreConflict(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("search index error: {0}")]
    Index(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Disposition of this error at the bus boundary.
    pub fn disposition(&self) -> Disposition {
        match self {
            Error::MalformedJson(_)
            | Error::MissingSource
            | Error::MissingSchema
            | Error::MissingClassification
            | Error::MissingSourceFields
            | Error::BadClassification
            | Error::Incoherent(_)
            | Error::EmptyMerge
            | Error::EmptyHistory
            | Error::SchemaMismatch { .. }
            | Error::UnknownContentType(_)
            | Error::Config(_) => Disposition::Permanent,

            Error::StoreTimeout(_)
            | Error::StoreConflict(_)
            | Error::Database(_)
            | Error::Index(_)
            | Error::Io(_) => Disposition::Temporary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_failures_are_permanent() {
        let err = Error::MalformedJson(serde_json::from_str::<serde_json::Value>("{").unwrap_err());
        assert_eq!(err.disposition(), Disposition::Permanent);
        assert_eq!(Error::MissingSource.disposition(), Disposition::Permanent);
        assert_eq!(Error::EmptyMerge.disposition(), Disposition::Permanent);
    }

    #[test]
    fn io_failures_are_temporary() {
        assert_eq!(
            Error::StoreTimeout("history lookup").disposition(),
            Disposition::Temporary
        );
        assert_eq!(
            Error::StoreConflict("current replace").disposition(),
            Disposition::Temporary
        );
        assert_eq!(
            Error::Index("connection refused".into()).disposition(),
            Disposition::Temporary
        );
    }
}
