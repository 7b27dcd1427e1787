//! Call value types
//!
//! This module provides the identifiers and snapshots the call controller
//! hands out. All actual signaling is delegated to the engine; nothing here
//! performs I/O.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::end_reason::EndReason;
use crate::error::{PhoneError, PhoneResult};

/// Opaque, engine-assigned identifier of one call
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallToken(String);

impl CallToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<String> for CallToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Lifecycle of a call: `Setup -> Established -> Cleared`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// Setup requested (or inbound call ringing), no media yet
    Setup,
    /// Engine reported the call established
    Established,
    /// Terminal
    Cleared,
}

impl CallState {
    pub fn is_live(&self) -> bool {
        !matches!(self, CallState::Cleared)
    }

    pub fn is_cleared(&self) -> bool {
        matches!(self, CallState::Cleared)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Setup => write!(f, "Setup"),
            CallState::Established => write!(f, "Established"),
            CallState::Cleared => write!(f, "Cleared"),
        }
    }
}

/// Direction of a call from the local endpoint's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

/// Engine-specific hints passed through with a setup request
///
/// `flags` and `options` are opaque to this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    pub flags: u32,
    pub options: HashMap<String, String>,
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Snapshot of a tracked call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallInfo {
    pub token: CallToken,
    /// Originator address
    pub party_a: String,
    /// Destination address
    pub party_b: String,
    pub direction: CallDirection,
    pub state: CallState,
    /// Set only once the call has cleared
    pub end_reason: Option<EndReason>,
    pub created_at: DateTime<Utc>,
    pub established_at: Option<DateTime<Utc>>,
    pub cleared_at: Option<DateTime<Utc>>,
}

/// Counters kept by the call controller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStats {
    /// Calls set up or received since the session started
    pub total_calls: u64,
    pub established_calls: u64,
    pub cleared_calls: u64,
    /// Calls currently tracked and not cleared
    pub active_calls: usize,
}

/// A DTMF signal to inject into a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DtmfTone {
    /// One of `0-9 # * A-D`
    Tone(char),
    /// `!`
    HookFlash,
    /// A literal space: extend the last tone instead of sending a new one
    UpdateLast,
}

impl DtmfTone {
    pub fn parse(tone: char) -> PhoneResult<Self> {
        match tone {
            '0'..='9' | '#' | '*' | 'A'..='D' => Ok(DtmfTone::Tone(tone)),
            '!' => Ok(DtmfTone::HookFlash),
            ' ' => Ok(DtmfTone::UpdateLast),
            other => Err(PhoneError::invalid_tone(other)),
        }
    }

    /// Character form understood by the engine
    pub fn as_char(&self) -> char {
        match self {
            DtmfTone::Tone(c) => *c,
            DtmfTone::HookFlash => '!',
            DtmfTone::UpdateLast => ' ',
        }
    }
}

impl TryFrom<char> for DtmfTone {
    type Error = PhoneError;

    fn try_from(tone: char) -> Result<Self, Self::Error> {
        DtmfTone::parse(tone)
    }
}
