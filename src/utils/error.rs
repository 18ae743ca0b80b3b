// src/utils/error.rs
use std::fmt;
use std::io::ErrorKind;
use thiserror::Error;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum DartError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error), // Automatically convert reqwest errors

    #[error("HTTP error: {0}")]
    Http(reqwest::StatusCode), // e.g., 404 Not Found, 503 Service Unavailable

    #[error("DART API returned status {status}: {message}")]
    Api { status: String, message: String },

    #[error("Identifier not recognised by DART: {0}")]
    InvalidIdentifier(String),

    #[error("Failed to parse DART response: {0}")]
    Parse(String),

    #[error("Corp code archive error: {0}")]
    Archive(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`DartError`], used for retry decisions and
/// for the `<operation>_error:<category>` reason tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Timeout,
    ConnectionError,
    TlsError,
    ProtocolError,
    ServerBusy,
    HttpStatus,
    InvalidIdentifier,
    ApiError,
    ParseError,
    IoError,
    RequestError,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "Timeout",
            ErrorCategory::ConnectionError => "ConnectionError",
            ErrorCategory::TlsError => "TlsError",
            ErrorCategory::ProtocolError => "ProtocolError",
            ErrorCategory::ServerBusy => "ServerBusy",
            ErrorCategory::HttpStatus => "HttpStatus",
            ErrorCategory::InvalidIdentifier => "InvalidIdentifier",
            ErrorCategory::ApiError => "ApiError",
            ErrorCategory::ParseError => "ParseError",
            ErrorCategory::IoError => "IoError",
            ErrorCategory::RequestError => "RequestError",
        }
    }

    /// Categories that describe a connectivity condition worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Timeout
                | ErrorCategory::ConnectionError
                | ErrorCategory::TlsError
                | ErrorCategory::ProtocolError
                | ErrorCategory::ServerBusy
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TLS_HINTS: &[&str] = &["certificate", "tls", "ssl", "handshake"];

impl DartError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DartError::Network(e) => {
                if e.is_timeout() {
                    ErrorCategory::Timeout
                } else if e.is_connect() {
                    let detail = self.detail().to_lowercase();
                    if TLS_HINTS.iter().any(|hint| detail.contains(hint)) {
                        ErrorCategory::TlsError
                    } else {
                        ErrorCategory::ConnectionError
                    }
                } else if e.is_decode() {
                    ErrorCategory::ParseError
                } else if e.is_body() {
                    ErrorCategory::ProtocolError
                } else if let Some(status) = e.status() {
                    status_category(status)
                } else {
                    ErrorCategory::RequestError
                }
            }
            DartError::Http(status) => status_category(*status),
            DartError::Api { .. } => ErrorCategory::ApiError,
            DartError::InvalidIdentifier(_) => ErrorCategory::InvalidIdentifier,
            DartError::Parse(_) | DartError::Archive(_) => ErrorCategory::ParseError,
            DartError::Io(e) => match e.kind() {
                ErrorKind::TimedOut => ErrorCategory::Timeout,
                ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof => ErrorCategory::ConnectionError,
                _ => ErrorCategory::IoError,
            },
        }
    }

    /// The error message followed by every source in its chain.
    /// reqwest keeps the interesting part ("connection closed before message completed")
    /// in the sources, not in the top-level message.
    pub fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        detail
    }
}

fn status_category(status: reqwest::StatusCode) -> ErrorCategory {
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        ErrorCategory::ServerBusy
    } else {
        ErrorCategory::HttpStatus
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Checkpoint file is malformed: {0}")]
    InvalidCheckpoint(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("DART interaction failed: {0}")]
    Dart(#[from] DartError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Listing file error: {0}")]
    Listing(String),
}
