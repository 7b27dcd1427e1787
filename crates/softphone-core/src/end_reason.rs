//! Call termination causes
//!
//! [`EndReason`] is the closed set of causes a signaling engine reports when a
//! call clears. Each known cause has exactly one canonical description; the
//! terminal sentinel code ([`EndReason::MAX_CODE`]) and any other
//! out-of-range code decode to [`EndReason::Unknown`], which has none.
//!
//! ```rust
//! use softphone_core::EndReason;
//!
//! assert_eq!(EndReason::from_code(17), EndReason::RemoteBusy);
//! assert_eq!(EndReason::RemoteBusy.describe(), Some("Remote endpoint busy"));
//! assert_eq!(EndReason::from_code(EndReason::MAX_CODE).describe(), None);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a call was cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndReason {
    LocalUser,
    NoAccept,
    AnswerDenied,
    RemoteUser,
    Refusal,
    NoAnswer,
    CallerAbort,
    TransportFail,
    ConnectFail,
    Gatekeeper,
    NoUser,
    NoBandwidth,
    CapabilityExchange,
    CallForwarded,
    SecurityDenial,
    LocalBusy,
    LocalCongestion,
    RemoteBusy,
    RemoteCongestion,
    Unreachable,
    NoEndPoint,
    HostOffline,
    TemporaryFailure,
    Q931Cause,
    DurationLimit,
    InvalidConferenceId,
    NoDialTone,
    NoRingBackTone,
    OutOfService,
    AcceptingCallWaiting,
    GkAdmissionFailed,
    /// A code outside the catalog, kept verbatim
    Unknown(u32),
}

/// Catalog in wire order; the index of each entry is its numeric code.
const CATALOG: [(EndReason, &str); 31] = [
    (EndReason::LocalUser, "Local endpoint application cleared call"),
    (EndReason::NoAccept, "Local endpoint did not accept call"),
    (EndReason::AnswerDenied, "Local endpoint declined to answer call"),
    (EndReason::RemoteUser, "Remote endpoint application cleared call"),
    (EndReason::Refusal, "Remote endpoint refused call"),
    (EndReason::NoAnswer, "Remote endpoint did not answer in required time"),
    (EndReason::CallerAbort, "Remote endpoint stopped calling"),
    (EndReason::TransportFail, "Transport error cleared call"),
    (EndReason::ConnectFail, "Transport connection failed to establish call"),
    (EndReason::Gatekeeper, "Gatekeeper has cleared call"),
    (EndReason::NoUser, "Call failed as could not find user"),
    (EndReason::NoBandwidth, "Call failed as could not get enough bandwidth"),
    (EndReason::CapabilityExchange, "Could not find common capabilities"),
    (EndReason::CallForwarded, "Call was forwarded using FACILITY message"),
    (EndReason::SecurityDenial, "Call failed a security check and was ended"),
    (EndReason::LocalBusy, "Local endpoint busy"),
    (EndReason::LocalCongestion, "Local endpoint congested"),
    (EndReason::RemoteBusy, "Remote endpoint busy"),
    (EndReason::RemoteCongestion, "Remote endpoint congested"),
    (EndReason::Unreachable, "Could not reach the remote party"),
    (EndReason::NoEndPoint, "The remote party is not running an endpoint"),
    (EndReason::HostOffline, "The remote party host off line"),
    (EndReason::TemporaryFailure, "The remote failed temporarily app may retry"),
    (EndReason::Q931Cause, "The remote ended the call with unmapped Q.931 cause code"),
    (EndReason::DurationLimit, "Call cleared due to an enforced duration limit"),
    (EndReason::InvalidConferenceId, "Call cleared due to invalid conference ID"),
    (EndReason::NoDialTone, "Call cleared due to missing dial tone"),
    (EndReason::NoRingBackTone, "Call cleared due to missing ringback tone"),
    (EndReason::OutOfService, "Call cleared because the line is out of service"),
    (EndReason::AcceptingCallWaiting, "Call cleared because another call is answered"),
    (EndReason::GkAdmissionFailed, "Call cleared because gatekeeper admission request failed"),
];

impl EndReason {
    /// Terminal sentinel code carried by engines; has no description.
    pub const MAX_CODE: u32 = CATALOG.len() as u32;

    /// Decode an engine-reported numeric cause
    pub fn from_code(code: u32) -> Self {
        CATALOG
            .get(code as usize)
            .map(|(reason, _)| *reason)
            .unwrap_or(EndReason::Unknown(code))
    }

    /// Numeric code understood by the engine
    pub fn code(&self) -> u32 {
        match self {
            EndReason::Unknown(code) => *code,
            known => CATALOG
                .iter()
                .position(|(reason, _)| reason == known)
                .map(|idx| idx as u32)
                .unwrap_or(Self::MAX_CODE),
        }
    }

    /// Canonical human-readable description, `None` for codes outside the catalog
    pub fn describe(&self) -> Option<&'static str> {
        match self {
            EndReason::Unknown(_) => None,
            known => CATALOG
                .iter()
                .find(|(reason, _)| reason == known)
                .map(|(_, text)| *text),
        }
    }

    /// All catalogued reasons in code order
    pub fn all() -> impl Iterator<Item = EndReason> {
        CATALOG.iter().map(|(reason, _)| *reason)
    }
}

impl Default for EndReason {
    fn default() -> Self {
        EndReason::LocalUser
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.describe() {
            Some(text) => write!(f, "{}", text),
            None => write!(f, "Unknown end reason ({})", self.code()),
        }
    }
}

/// Free-function form of [`EndReason::describe`]
pub fn describe(reason: EndReason) -> Option<&'static str> {
    reason.describe()
}
