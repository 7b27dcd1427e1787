//! Error types for the softphone-core library
//!
//! Every fallible operation in this crate returns [`PhoneResult`]. The error
//! taxonomy is deliberately small: call operations and registration
//! operations share one enum so that a caller driving both controllers can
//! match on a single type.
//!
//! # Error Categories
//!
//! - **Call Errors** - bad destinations, unknown tokens, invalid DTMF tones
//! - **Registration Errors** - unresolvable or untracked addresses of record
//! - **Engine Errors** - opaque failures reported by the signaling engine
//! - **Configuration Errors** - invalid session settings
//! - **System Errors** - timeouts, cancelled background work, internal faults
//!
//! Lifecycle notifications (a call cleared with `RemoteBusy`, a registration
//! answered with `403`) are never errors. They are delivered through the
//! event dispatcher.
//!
//! ```rust
//! use softphone_core::PhoneError;
//!
//! let err = PhoneError::invalid_tone('x');
//! assert_eq!(err.category(), "call");
//! assert!(err.is_call_error());
//! ```

use thiserror::Error;

use crate::call::CallToken;
use crate::engine::EngineError;

/// Result type alias for softphone-core operations
pub type PhoneResult<T> = Result<T, PhoneError>;

/// Errors returned by the call controller
pub type CallError = PhoneError;

/// Errors returned by the registration controller
pub type RegError = PhoneError;

/// Error taxonomy for call control and registration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// Destination address was empty or malformed
    #[error("Invalid destination '{address}': {reason}")]
    InvalidDestination { address: String, reason: String },

    /// Token does not name a live call
    #[error("Unknown call token: {token}")]
    UnknownToken { token: CallToken },

    /// A live call already uses this token
    #[error("Call already exists: {token}")]
    CallAlreadyExists { token: CallToken },

    /// Operation only valid for inbound calls that are still ringing
    #[error("Call {token} is not an unanswered incoming call")]
    NotIncoming { token: CallToken },

    /// DTMF character outside `0-9 # * A-D !` and space
    #[error("Invalid DTMF tone: {tone:?}")]
    InvalidTone { tone: char },

    /// No registration is tracked for this address of record
    #[error("Not registered: {address_of_record}")]
    NotRegistered { address_of_record: String },

    /// Address of record could not be resolved to a usable identity
    #[error("Invalid address of record: {reason}")]
    InvalidAddressOfRecord { reason: String },

    /// Opaque failure surfaced by the signaling engine
    #[error("Engine failure: {detail}")]
    EngineFailure { detail: String, code: Option<i32> },

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Background work finished without delivering a result
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl PhoneError {
    pub fn invalid_destination(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDestination {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_token(token: &CallToken) -> Self {
        Self::UnknownToken {
            token: token.clone(),
        }
    }

    pub fn invalid_tone(tone: char) -> Self {
        Self::InvalidTone { tone }
    }

    pub fn not_registered(address_of_record: impl Into<String>) -> Self {
        Self::NotRegistered {
            address_of_record: address_of_record.into(),
        }
    }

    pub fn invalid_address_of_record(reason: impl Into<String>) -> Self {
        Self::InvalidAddressOfRecord {
            reason: reason.into(),
        }
    }

    pub fn engine_failure(detail: impl Into<String>) -> Self {
        Self::EngineFailure {
            detail: detail.into(),
            code: None,
        }
    }

    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Check if this error concerns a specific call
    pub fn is_call_error(&self) -> bool {
        matches!(
            self,
            PhoneError::InvalidDestination { .. }
                | PhoneError::UnknownToken { .. }
                | PhoneError::CallAlreadyExists { .. }
                | PhoneError::NotIncoming { .. }
                | PhoneError::InvalidTone { .. }
        )
    }

    /// Check if this error concerns a registration
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            PhoneError::NotRegistered { .. } | PhoneError::InvalidAddressOfRecord { .. }
        )
    }

    /// Get the error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            PhoneError::InvalidDestination { .. }
            | PhoneError::UnknownToken { .. }
            | PhoneError::CallAlreadyExists { .. }
            | PhoneError::NotIncoming { .. }
            | PhoneError::InvalidTone { .. } => "call",

            PhoneError::NotRegistered { .. } | PhoneError::InvalidAddressOfRecord { .. } => {
                "registration"
            }

            PhoneError::EngineFailure { .. } => "engine",

            PhoneError::InvalidConfiguration { .. } => "configuration",

            PhoneError::Cancelled { .. } | PhoneError::InternalError { .. } => "system",
        }
    }
}

impl From<EngineError> for PhoneError {
    fn from(err: EngineError) -> Self {
        PhoneError::EngineFailure {
            code: err.code(),
            detail: err.to_string(),
        }
    }
}
