//! Error types for the accounts client.
//!
//! # Design
//! Failures are split by where they happen: building the request locally,
//! the network exchange, the caller's context firing, and the server
//! answering with a status the operation did not expect. Status errors keep
//! the operation name and raw body so callers can log or inspect them.

use std::fmt;

use thiserror::Error;

/// Why a `Context` stopped a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Cancelled {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// The client operation an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateAccount,
    FetchAccount,
    DeleteAccount,
    ListAccounts,
    HealthCheck,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::CreateAccount => "CreateAccount",
            Operation::FetchAccount => "FetchAccount",
            Operation::DeleteAccount => "DeleteAccount",
            Operation::ListAccounts => "ListAccounts",
            Operation::HealthCheck => "HealthCheck",
        };
        f.write_str(name)
    }
}

/// Errors returned by `AccountsClient` and `Transport` implementations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be built: bad base URL or path, or the body
    /// failed to serialize.
    #[error("failed to build request: {0}")]
    RequestBuild(String),

    /// The HTTP exchange failed before a response was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// The caller's context was cancelled or its deadline passed.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// The server answered with a status other than the one the operation
    /// expects.
    #[error("{operation} :: unexpected status code: {status}")]
    UnexpectedStatus {
        operation: Operation,
        status: u16,
        body: String,
    },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The health endpoint never returned 200 within the poll policy.
    #[error("service unavailable after {attempts} health checks")]
    ServiceUnavailable { attempts: u32 },
}

impl ApiError {
    /// Status code of an `UnexpectedStatus` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
