// Error types for routeview

use std::net::IpAddr;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("No route to host: {0}")]
    RouteNotFound(IpAddr),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Failed to execute command: {0}")]
    CommandExecution(String),

    #[error("Failed to parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn parse(what: &'static str, detail: impl Into<String>) -> Self {
        AppError::Parse {
            what,
            detail: detail.into(),
        }
    }

    /// Convert error to user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AppError::Input(_) => {
                "Provide two distinct addresses of the same family (both IPv4 or both IPv6).".to_string()
            }
            AppError::RouteNotFound(addr) => {
                format!("The routing table has no route towards {}.", addr)
            }
            AppError::UnsupportedPlatform(_) => {
                "Only Linux and BSD-family systems (macOS, FreeBSD, OpenBSD, NetBSD) are supported.".to_string()
            }
            AppError::CommandExecution(cmd) => {
                format!("Failed to execute command. Make sure {} is installed.", cmd)
            }
            AppError::Parse { what, .. } => {
                format!("Unexpected {} output. This might be a bug, please report it.", what)
            }
            AppError::Io(_) => "System error while querying the network tables.".to_string(),
            AppError::Serialization(_) => {
                "Data format error. This might be a bug, please report it.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_not_found_names_address() {
        let err = AppError::RouteNotFound("192.0.2.7".parse().unwrap());
        assert_eq!(err.to_string(), "No route to host: 192.0.2.7");
        assert!(err.user_message().contains("192.0.2.7"));
    }

    #[test]
    fn test_parse_error_display() {
        let err = AppError::parse("route", "missing interface");
        assert_eq!(err.to_string(), "Failed to parse route: missing interface");
    }
}
