//! # Registration status codes
//!
//! [`StatusCode`] mirrors the SIP response codes a signaling engine reports
//! for a registration transaction, plus four synthetic local codes (`0..=3`)
//! for failures that never reached the wire. Wire values are bit-exact with
//! RFC 3261; local values sit below `100` so they cannot collide.
//!
//! Codes are classified into a [`Band`] by numeric range:
//!
//! - `1xx`: Informational
//! - `2xx`: Success
//! - `3xx`: Redirection
//! - `4xx`: Client Failure
//! - `5xx`: Server Failure
//! - `6xx`: Global Failure
//! - `0..=3`: Local
//!
//! ```rust
//! use softphone_core::status::{band_of, Band, StatusCode};
//!
//! assert_eq!(band_of(StatusCode::Ringing), Band::Informational);
//! assert_eq!(band_of(StatusCode::from_u16(404).unwrap()), Band::ClientFailure);
//! assert_eq!(band_of(StatusCode::from_u16(603).unwrap()), Band::GlobalFailure);
//! assert_eq!(band_of(StatusCode::LocalTimeout), Band::Local);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome code of a signaling transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    // Local, never on the wire
    IllegalStatusCode,
    LocalTransportError,
    LocalBadTransportAddress,
    LocalTimeout,

    // 1xx
    Trying,
    Ringing,
    CallIsBeingForwarded,
    Queued,
    SessionProgress,

    // 2xx
    Ok,
    Accepted,

    // 3xx
    MultipleChoices,
    MovedPermanently,
    MovedTemporarily,
    UseProxy,
    AlternativeService,

    // 4xx
    BadRequest,
    Unauthorized,
    PaymentRequired,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    ProxyAuthenticationRequired,
    RequestTimeout,
    Conflict,
    Gone,
    LengthRequired,
    RequestEntityTooLarge,
    RequestUriTooLong,
    UnsupportedMediaType,
    UnsupportedUriScheme,
    BadExtension,
    ExtensionRequired,
    IntervalTooBrief,
    TemporarilyUnavailable,
    CallOrTransactionDoesNotExist,
    LoopDetected,
    TooManyHops,
    AddressIncomplete,
    Ambiguous,
    BusyHere,
    RequestTerminated,
    NotAcceptableHere,
    BadEvent,
    RequestPending,
    Undecipherable,

    // 5xx
    ServerInternalError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    ServerTimeout,
    VersionNotSupported,
    MessageTooLarge,

    // 6xx
    BusyEverywhere,
    Decline,
    DoesNotExistAnywhere,
    NotAcceptable606,

    /// Any other wire code in `100..=699`
    Custom(UnlistedCode),
}

/// Wire code in `100..=699` with no named [`StatusCode`] variant
///
/// Only obtainable through [`StatusCode::from_u16`] or `TryFrom<u16>`, so a
/// custom code never shadows a named or local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct UnlistedCode(u16);

impl UnlistedCode {
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for UnlistedCode {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        if !(100..=699).contains(&code) {
            return Err(format!("{} is outside the wire range 100..=699", code));
        }
        if TABLE.iter().any(|(_, value, _)| *value == code) {
            return Err(format!("{} has a named status code", code));
        }
        Ok(UnlistedCode(code))
    }
}

impl From<UnlistedCode> for u16 {
    fn from(code: UnlistedCode) -> u16 {
        code.0
    }
}

const TABLE: &[(StatusCode, u16, &str)] = &[
    (StatusCode::IllegalStatusCode, 0, "Illegal Status Code"),
    (StatusCode::LocalTransportError, 1, "Local Transport Error"),
    (StatusCode::LocalBadTransportAddress, 2, "Local Bad Transport Address"),
    (StatusCode::LocalTimeout, 3, "Local Timeout"),
    (StatusCode::Trying, 100, "Trying"),
    (StatusCode::Ringing, 180, "Ringing"),
    (StatusCode::CallIsBeingForwarded, 181, "Call Is Being Forwarded"),
    (StatusCode::Queued, 182, "Queued"),
    (StatusCode::SessionProgress, 183, "Session Progress"),
    (StatusCode::Ok, 200, "OK"),
    (StatusCode::Accepted, 202, "Accepted"),
    (StatusCode::MultipleChoices, 300, "Multiple Choices"),
    (StatusCode::MovedPermanently, 301, "Moved Permanently"),
    (StatusCode::MovedTemporarily, 302, "Moved Temporarily"),
    (StatusCode::UseProxy, 305, "Use Proxy"),
    (StatusCode::AlternativeService, 380, "Alternative Service"),
    (StatusCode::BadRequest, 400, "Bad Request"),
    (StatusCode::Unauthorized, 401, "Unauthorized"),
    (StatusCode::PaymentRequired, 402, "Payment Required"),
    (StatusCode::Forbidden, 403, "Forbidden"),
    (StatusCode::NotFound, 404, "Not Found"),
    (StatusCode::MethodNotAllowed, 405, "Method Not Allowed"),
    (StatusCode::NotAcceptable, 406, "Not Acceptable"),
    (StatusCode::ProxyAuthenticationRequired, 407, "Proxy Authentication Required"),
    (StatusCode::RequestTimeout, 408, "Request Timeout"),
    (StatusCode::Conflict, 409, "Conflict"),
    (StatusCode::Gone, 410, "Gone"),
    (StatusCode::LengthRequired, 411, "Length Required"),
    (StatusCode::RequestEntityTooLarge, 413, "Request Entity Too Large"),
    (StatusCode::RequestUriTooLong, 414, "Request-URI Too Long"),
    (StatusCode::UnsupportedMediaType, 415, "Unsupported Media Type"),
    (StatusCode::UnsupportedUriScheme, 416, "Unsupported URI Scheme"),
    (StatusCode::BadExtension, 420, "Bad Extension"),
    (StatusCode::ExtensionRequired, 421, "Extension Required"),
    (StatusCode::IntervalTooBrief, 423, "Interval Too Brief"),
    (StatusCode::TemporarilyUnavailable, 480, "Temporarily Unavailable"),
    (StatusCode::CallOrTransactionDoesNotExist, 481, "Call/Transaction Does Not Exist"),
    (StatusCode::LoopDetected, 482, "Loop Detected"),
    (StatusCode::TooManyHops, 483, "Too Many Hops"),
    (StatusCode::AddressIncomplete, 484, "Address Incomplete"),
    (StatusCode::Ambiguous, 485, "Ambiguous"),
    (StatusCode::BusyHere, 486, "Busy Here"),
    (StatusCode::RequestTerminated, 487, "Request Terminated"),
    (StatusCode::NotAcceptableHere, 488, "Not Acceptable Here"),
    (StatusCode::BadEvent, 489, "Bad Event"),
    (StatusCode::RequestPending, 491, "Request Pending"),
    (StatusCode::Undecipherable, 493, "Undecipherable"),
    (StatusCode::ServerInternalError, 500, "Server Internal Error"),
    (StatusCode::NotImplemented, 501, "Not Implemented"),
    (StatusCode::BadGateway, 502, "Bad Gateway"),
    (StatusCode::ServiceUnavailable, 503, "Service Unavailable"),
    (StatusCode::ServerTimeout, 504, "Server Time-out"),
    (StatusCode::VersionNotSupported, 505, "Version Not Supported"),
    (StatusCode::MessageTooLarge, 513, "Message Too Large"),
    (StatusCode::BusyEverywhere, 600, "Busy Everywhere"),
    (StatusCode::Decline, 603, "Decline"),
    (StatusCode::DoesNotExistAnywhere, 604, "Does Not Exist Anywhere"),
    (StatusCode::NotAcceptable606, 606, "Not Acceptable"),
];

/// Classification of a [`StatusCode`] by numeric range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    Informational,
    Success,
    Redirection,
    ClientFailure,
    ServerFailure,
    GlobalFailure,
    /// Synthetic code raised by the local stack
    Local,
}

impl StatusCode {
    /// Decode a numeric code.
    ///
    /// Returns `None` for values that are neither local (`0..=3`) nor in the
    /// wire range (`100..=699`).
    pub fn from_u16(code: u16) -> Option<Self> {
        if let Some((status, _, _)) = TABLE.iter().find(|(_, value, _)| *value == code) {
            return Some(*status);
        }
        match code {
            100..=699 => Some(StatusCode::Custom(UnlistedCode(code))),
            _ => None,
        }
    }

    /// Numeric value, bit-exact with the wire protocol for non-local codes
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Custom(code) => code.value(),
            known => TABLE
                .iter()
                .find(|(status, _, _)| status == known)
                .map(|(_, value, _)| *value)
                .unwrap_or(0),
        }
    }

    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Custom(_) => "Unknown",
            known => TABLE
                .iter()
                .find(|(status, _, _)| status == known)
                .map(|(_, _, phrase)| *phrase)
                .unwrap_or("Unknown"),
        }
    }

    pub fn band(&self) -> Band {
        match self.as_u16() {
            0..=99 => Band::Local,
            100..=199 => Band::Informational,
            200..=299 => Band::Success,
            300..=399 => Band::Redirection,
            400..=499 => Band::ClientFailure,
            500..=599 => Band::ServerFailure,
            _ => Band::GlobalFailure,
        }
    }

    /// Whether this code was synthesized locally rather than received
    pub fn is_local(&self) -> bool {
        self.band() == Band::Local
    }

    pub fn is_provisional(&self) -> bool {
        self.band() == Band::Informational
    }

    pub fn is_success(&self) -> bool {
        self.band() == Band::Success
    }

    /// Any final outcome other than success, local failures included
    pub fn is_failure(&self) -> bool {
        !matches!(self.band(), Band::Informational | Band::Success)
    }
}

/// Classify a status code by numeric range
pub fn band_of(code: StatusCode) -> Band {
    code.band()
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}
