//! Typed errors for the ingestion pipeline and the corpus query engine.
//!
//! Batch-level failures ([`IngestError`]) map one-to-one onto the
//! [`IngestStatus`](crate::ingest::IngestStatus) reported through the
//! webhook. Query-level faults ([`ExtractionFault`]) are isolated per stored
//! row and never reach the caller; only [`StoreError`] fails a query.

use thiserror::Error;

/// A row failed required-field mapping.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("row has {found} columns, layout requires {required}")]
    TooFewColumns { found: usize, required: usize },
    #[error("missing vehicle identifier")]
    MissingIdentifier,
    #[error("price '{0}' is not a decimal number")]
    InvalidPrice(String),
    #[error("price must be > 0, got {0}")]
    NonPositivePrice(f64),
}

/// Serializer fault inside the document encoder. Never caused by content.
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("XML writer error: {0}")]
    Writer(String),
    #[error("encoded document is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// The encoded document was rejected by the schema validator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaValidationError {
    #[error("malformed XML: {0}")]
    Malformed(String),
    #[error("unexpected root element '{0}'")]
    UnexpectedRoot(String),
    #[error("missing required attribute '{attribute}' on <{element}>")]
    MissingAttribute { element: String, attribute: String },
    #[error("missing required element <{0}>")]
    MissingElement(String),
    #[error("vehicle {index}: {message}")]
    InvalidVehicle { index: usize, message: String },
}

/// Persistence fault. Aborts the current ingest; total store unavailability
/// is the only hard failure of a query.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One stored row's document could not be read during a query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionFault {
    #[error("document is not well-formed XML: {0}")]
    Malformed(String),
    #[error("vehicle {index} has no value at {path}")]
    MissingValue { index: usize, path: &'static str },
    #[error("vehicle {index}: '{value}' at {path} is not a number")]
    NotANumber {
        index: usize,
        path: &'static str,
        value: String,
    },
}

/// Batch-level ingest failure.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("tabular input error at line {line}: {message}")]
    Tabular { line: usize, message: String },
    #[error("line {line}: {source}")]
    Mapping {
        line: usize,
        #[source]
        source: MappingError,
    },
    #[error("batch contains no valid records")]
    EmptyBatch,
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("schema validation failed: {0}")]
    SchemaValidation(#[from] SchemaValidationError),
    #[error(transparent)]
    Storage(#[from] StoreError),
}
