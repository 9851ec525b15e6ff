//! Defines the custom error types for the site-sleuth application.

use std::io;
use thiserror::Error;
use url::ParseError as UrlParseError;

/// The primary error type for a search run.
#[derive(Error, Debug)]
pub(crate) enum AppError {
    /// Required configuration (API credentials, keyword) is absent. Fatal at startup.
    #[error("Missing Configuration: {0}")]
    ConfigurationMissing(String),

    /// Error related to file input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Error during JSON serialization or deserialization.
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error parsing a URL.
    #[error("URL Parsing Error: {0}")]
    UrlParse(#[from] UrlParseError),

    /// Error making HTTP requests via reqwest.
    #[error("HTTP Request Error: {0}")]
    Request(#[from] reqwest::Error),

    /// The search API answered with an error payload or an unusable response.
    #[error("Search API Error: {0}")]
    Search(String),

    /// Interactive prompt failed (e.g., stdin closed).
    #[error("Prompt Error: {0}")]
    Prompt(#[from] dialoguer::Error),

    /// Failed to extract a domain from the provided URL.
    #[error("Failed to extract domain from URL: {0}")]
    DomainExtraction(String),

    /// An underlying error that doesn't fit other categories, using anyhow.
    #[error("Generic Error: {0}")]
    Generic(#[from] anyhow::Error),
}

pub(crate) type Result<T> = std::result::Result<T, AppError>;

/// Why a single page could not be retrieved. Always recoverable: the candidate is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub(crate) enum FetchError {
    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The server answered with a non-2xx status.
    #[error("non-success status {0}")]
    Status(u16),

    /// The response is not an HTML document.
    #[error("non-HTML content type '{0}'")]
    NotHtml(String),

    /// Connection, TLS, or body transfer failure.
    #[error("network failure: {0}")]
    Network(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Translation backend failure. The caller keeps the original text.
#[derive(Error, Debug)]
pub(crate) enum TranslationError {
    /// Backend unreachable or answered with an error status.
    #[error("translation backend unavailable: {0}")]
    Unavailable(String),

    /// Backend answered with a body we could not interpret.
    #[error("malformed translation response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for TranslationError {
    fn from(e: reqwest::Error) -> Self {
        TranslationError::Unavailable(e.to_string())
    }
}
