// SPDX-License-Identifier: MIT
//
// Embargo Gate: Time-Gated Request Admission
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! Error types for the embargo gate
//!
//! Provides a unified error taxonomy using `thiserror` for ergonomic error handling.

pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for embargo operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Deadline literal could not be parsed
    #[error("Invalid embargo deadline: {0}")]
    Parse(String),

    /// Dynamic resolver failed or produced no value
    #[error("Deadline resolution failed: {0}")]
    Resolution(String),

    /// Dynamic resolution exceeded its bounded wait
    #[error("Deadline resolution timed out")]
    Timeout,

    /// Network communication with a deadline service failed
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl Error {
    /// Errors that must abort registration (and therefore server startup)
    pub fn is_registration_error(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Parse(_))
    }

    /// Errors raised while resolving a dynamic deadline for one request
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Error::Resolution(_) | Error::Timeout | Error::Network(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}
