//! Signaling engine seam
//!
//! The SIP/RTP stack, STUN client and media pipeline live behind
//! [`SignalingEngine`]. The session talks to the engine through this trait
//! and receives engine notifications through [`EngineEventSink`], which the
//! session installs with [`SignalingEngine::attach`].
//!
//! Engine callbacks may arrive on any thread, so sinks are synchronous and
//! must not block.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::call::{CallToken, ConnectionOptions, DtmfTone};
use crate::end_reason::EndReason;
use crate::registration::{AddressOfRecord, CompatibilityMode, RetryInterval};

/// NAT classification reported by the engine's STUN client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NatType {
    #[default]
    Unknown,
    Open,
    Cone,
    Restricted,
    PortRestricted,
    Symmetric,
    SymmetricFirewall,
    Blocked,
    PartialBlocked,
}

/// Product identification announced by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub name: String,
    pub vendor: String,
    pub version: String,
}

impl Default for ProductInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            vendor: "softphone".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Register request as handed to the engine, after resolution
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRegistration {
    pub address_of_record: AddressOfRecord,
    pub registrar: String,
    pub auth_identity: Option<String>,
    pub credential: Option<String>,
    pub realm: Option<String>,
    pub proxy: Option<String>,
    pub expire_interval: Duration,
    pub min_retry_interval: RetryInterval,
    pub max_retry_interval: RetryInterval,
    pub compatibility_mode: CompatibilityMode,
}

/// Failures surfaced by an engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine rejected request: {reason} ({code})")]
    Rejected { reason: String, code: i32 },

    #[error("engine unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("engine does not know token {token}")]
    NoSuchCall { token: String },

    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Engine-specific numeric code, if any
    pub fn code(&self) -> Option<i32> {
        match self {
            EngineError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Operations the core delegates to the signaling/media engine
#[async_trait]
pub trait SignalingEngine: Send + Sync {
    /// Start an outbound call; returns the engine's token for it
    async fn setup_call(&self, party_a: &str, party_b: &str, options: &ConnectionOptions) -> EngineResult<CallToken>;

    /// Request teardown; `false` means the engine had no such call
    async fn clear_call(&self, token: &CallToken, reason: EndReason) -> EngineResult<bool>;

    /// `duration` of `None` uses the engine's default tone length
    async fn send_tone(&self, token: &CallToken, tone: DtmfTone, duration: Option<Duration>) -> EngineResult<()>;

    /// Returns the address of record the engine registered, which may differ
    /// from the one requested
    async fn register(&self, request: &EngineRegistration) -> EngineResult<AddressOfRecord>;

    async fn unregister(&self, aor: &AddressOfRecord) -> EngineResult<bool>;

    /// An empty list means the engine's default interfaces
    async fn start_listeners(&self, interfaces: &[String]) -> EngineResult<bool>;

    /// Two or more parties with media flowing
    fn is_call_established(&self, token: &CallToken) -> bool;

    fn is_registered(&self, aor: &AddressOfRecord, check_offline: bool) -> bool;

    async fn accept_incoming(&self, token: &CallToken) -> EngineResult<()>;

    async fn reject_incoming(&self, token: &CallToken, reason: EndReason) -> EngineResult<()>;

    /// May block for several seconds while NAT type is probed
    async fn set_stun_server(&self, server: &str) -> EngineResult<NatType>;

    async fn set_translation_host(&self, host: &str) -> EngineResult<bool>;

    async fn add_route_entry(&self, spec: &str) -> EngineResult<bool>;

    fn set_product_info(&self, info: &ProductInfo);

    async fn shutdown_endpoints(&self) -> EngineResult<()>;

    /// Install the receiver of engine notifications
    fn attach(&self, sink: Arc<dyn EngineEventSink>);

    /// Stop delivering notifications
    fn detach(&self);
}

/// Notifications from the engine to the core
pub trait EngineEventSink: Send + Sync {
    fn on_call_established(&self, token: &CallToken);

    fn on_call_cleared(&self, token: &CallToken, party_a: &str, party_b: &str, end_reason_code: u32);

    fn on_registration_status(&self, aor: &str, was_registering: bool, re_registering: bool, status_code: u16);

    /// An inbound call is ringing
    fn on_incoming_call(&self, token: &CallToken, remote_name: &str, remote_address: &str);

    /// The remote end of an outbound call is alerting
    fn on_outgoing_call(&self, remote_name: &str);
}
