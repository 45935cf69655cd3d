//! Error handling for the network speed tester

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Custom error types for the network speed tester
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network connectivity errors
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors (file operations, sockets, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Parsing errors (URLs, JSON, etc.)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// The peer answered, but not with what the protocol expects
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Offer/answer exchange failures
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// Result store failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// The server is at capacity for this kind of request
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// A looked-up record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Test execution errors
    #[error("Test execution error: {0}")]
    TestExecution(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network(message.into())
    }

    /// Create a new HTTP request error
    pub fn http_request<S: Into<String>>(message: S) -> Self {
        Self::HttpRequest(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a new signaling error
    pub fn signaling<S: Into<String>>(message: S) -> Self {
        Self::Signaling(message.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage(message.into())
    }

    /// Create a new unavailable error
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable(message.into())
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a new test execution error
    pub fn test_execution<S: Into<String>>(message: S) -> Self {
        Self::TestExecution(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Network(_) => "NETWORK",
            Self::HttpRequest(_) => "HTTP",
            Self::Timeout(_) => "TIMEOUT",
            Self::Validation(_) => "VALIDATION",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Protocol(_) => "PROTOCOL",
            Self::Signaling(_) => "SIGNALING",
            Self::Storage(_) => "STORAGE",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::TestExecution(_) => "TEST",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Transport-level failures: the network itself misbehaved
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::HttpRequest(_) | Self::Timeout(_) | Self::Io(_))
    }

    /// Protocol-level failures: the peer is reachable but misconfigured
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Signaling(_) | Self::Parse(_))
    }

    /// Check if error is recoverable (can retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) | Self::HttpRequest(_) | Self::Timeout(_) | Self::Storage(_) | Self::Unavailable(_) => true,
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) | Self::Protocol(_) | Self::Signaling(_) => false,
            Self::Io(_) | Self::NotFound(_) | Self::TestExecution(_) | Self::Internal(_) => false,
        }
    }

    /// Get user-friendly error message with suggestions
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Config(msg) => {
                format!("Configuration problem: {}\n\nSuggestion: Check your .env file or command line arguments.", msg)
            }
            Self::Network(msg) | Self::Timeout(msg) => {
                format!("Network connectivity issue: {}\n\nSuggestion: Check that the test server is running and reachable.", msg)
            }
            Self::HttpRequest(msg) => {
                format!("HTTP request failed: {}\n\nSuggestion: The test server rejected the request; check its logs.", msg)
            }
            Self::Protocol(msg) | Self::Signaling(msg) => {
                format!("Unexpected server response: {}\n\nSuggestion: Client and server versions or configuration may not match.", msg)
            }
            Self::Storage(msg) => {
                format!("Result could not be stored: {}\n\nSuggestion: Results are still shown locally; check the server's data directory.", msg)
            }
            Self::NotFound(msg) => {
                format!("Nothing found: {}\n\nSuggestion: Check the result id.", msg)
            }
            other => other.to_string(),
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => 1,  // Invalid configuration/usage
            Self::Network(_) | Self::HttpRequest(_) | Self::Unavailable(_) => 2,  // Network issues
            Self::Timeout(_) => 3,  // Timeout issues
            Self::Protocol(_) | Self::Signaling(_) => 4,  // Server speaks something unexpected
            Self::Io(_) | Self::Storage(_) => 5,  // I/O issues
            Self::NotFound(_) => 6,
            Self::TestExecution(_) => 7,
            Self::Internal(_) => 99,  // Internal/unexpected errors
        }
    }

    /// HTTP status code used when this error ends a server request
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Validation(_) | Self::Parse(_) | Self::Signaling(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Validation(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::Network(_) | Self::HttpRequest(_) | Self::Timeout(_) | Self::Unavailable(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Protocol(_) | Self::Signaling(_) => {
                    format!("[{}] {}", category.magenta().bold(), message.magenta())
                }
                Self::Io(_) | Self::Storage(_) | Self::NotFound(_) | Self::TestExecution(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

/// Server responses carry `{status: "error", message}` so a browser can show the reason
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::NotFound(_) => "result not found".to_string(),
            Self::Signaling(_) => "Invalid SDP offer format".to_string(),
            other => other.to_string(),
        };
        let body = serde_json::json!({ "status": "error", "message": message });
        (status, Json(body)).into_response()
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string())
        } else if error.is_connect() || error.is_request() {
            Self::network(error.to_string())
        } else if error.is_decode() {
            Self::protocol(error.to_string())
        } else {
            Self::http_request(error.to_string())
        }
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::num::ParseFloatError> for AppError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::parse(format!("Float parse error: {}", error))
    }
}

impl From<std::str::ParseBoolError> for AppError {
    fn from(error: std::str::ParseBoolError) -> Self {
        Self::parse(format!("Boolean parse error: {}", error))
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;
