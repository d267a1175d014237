use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Failed to read record {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write record {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Record has no path to synchronize to")]
    NoPath,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid FIT: {0}")]
    InvalidFit(String),
    #[error("Invalid TCX: {0}")]
    InvalidTcx(String),
    #[error("Invalid GPX: {0}")]
    InvalidGpx(String),
    #[error("Unsupported GPS file format: {0}")]
    UnsupportedFormat(String),
    #[error("Decompression of {path} failed: {reason}")]
    Decompress { path: PathBuf, reason: String },
    #[error("Failed to read GPS file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("Field {0} is read-only")]
    ReadOnly(String),
    #[error("Invalid value for {field}: {value:?}")]
    InvalidValue { field: String, value: String },
    #[error("Unknown field: {0}")]
    UnknownField(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("Failed to scan activity directory {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Record {0} has no usable Date field")]
    MissingDate(PathBuf),
    #[error("An activity already exists at {0}")]
    AlreadyExists(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Unknown field in query: {0}")]
    UnknownField(String),
    #[error("Cannot compare {field} with {value:?}")]
    InvalidValue { field: String, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Activity(#[from] ActivityError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Query(#[from] QueryError),
}
