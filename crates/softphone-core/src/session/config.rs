//! Session configuration
//!
//! [`SessionConfig`] gathers everything a [`Session`](crate::Session) pushes
//! to the engine at startup plus the knobs the controllers use. It is
//! serde-serializable and can be loaded from JSON.
//!
//! ```rust
//! use softphone_core::SessionConfig;
//!
//! let config = SessionConfig::new()
//!     .with_local_party("sip:alice@10.0.0.5")
//!     .with_listener("udp$0.0.0.0:5060")
//!     .with_stun_server("stun.example.com")
//!     .with_registration_timeout_secs(10);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.listeners.len(), 1);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::ProductInfo;
use crate::error::{PhoneError, PhoneResult};

/// Placeholder originator used when a setup request leaves `party_a` empty
pub const DEFAULT_LOCAL_PARTY: &str = "pc:*";

/// Highest accepted `debug_level`
pub const MAX_DEBUG_LEVEL: u8 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Announced by the engine in signaling
    pub product: ProductInfo,
    pub local_party: String,
    /// Listener interfaces; empty means engine defaults
    pub listeners: Vec<String>,
    pub stun_server: Option<String>,
    /// Public address to advertise when behind NAT
    pub translation_host: Option<String>,
    /// Route table entries, in the engine's route syntax
    pub routes: Vec<String>,
    /// Bound on synchronous register waits
    pub registration_timeout_secs: u64,
    /// Expiry used when register params leave it unset
    pub default_expire_secs: u64,
    /// DTMF tone length; `None` keeps the engine default
    pub dtmf_duration_ms: Option<u64>,
    /// 0 (off) to 8 (everything)
    pub debug_level: Option<u8>,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            product: ProductInfo::default(),
            local_party: DEFAULT_LOCAL_PARTY.to_string(),
            listeners: Vec::new(),
            stun_server: None,
            translation_host: None,
            routes: Vec::new(),
            registration_timeout_secs: 32,
            default_expire_secs: 3600,
            dtmf_duration_ms: None,
            debug_level: None,
        }
    }

    pub fn from_json_str(json: &str) -> PhoneResult<Self> {
        serde_json::from_str(json).map_err(|e| PhoneError::invalid_configuration("json", e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> PhoneResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| PhoneError::invalid_configuration(path.display().to_string(), e.to_string()))?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> PhoneResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PhoneError::internal_error(e.to_string()))
    }

    pub fn with_product(mut self, product: ProductInfo) -> Self {
        self.product = product;
        self
    }

    pub fn with_local_party(mut self, local_party: impl Into<String>) -> Self {
        self.local_party = local_party.into();
        self
    }

    pub fn with_listener(mut self, interface: impl Into<String>) -> Self {
        self.listeners.push(interface.into());
        self
    }

    pub fn with_stun_server(mut self, server: impl Into<String>) -> Self {
        self.stun_server = Some(server.into());
        self
    }

    pub fn with_translation_host(mut self, host: impl Into<String>) -> Self {
        self.translation_host = Some(host.into());
        self
    }

    pub fn with_route(mut self, spec: impl Into<String>) -> Self {
        self.routes.push(spec.into());
        self
    }

    pub fn with_registration_timeout_secs(mut self, secs: u64) -> Self {
        self.registration_timeout_secs = secs;
        self
    }

    pub fn with_default_expire_secs(mut self, secs: u64) -> Self {
        self.default_expire_secs = secs;
        self
    }

    pub fn with_dtmf_duration_ms(mut self, ms: u64) -> Self {
        self.dtmf_duration_ms = Some(ms);
        self
    }

    pub fn with_debug_level(mut self, level: u8) -> Self {
        self.debug_level = Some(level);
        self
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs)
    }

    pub fn default_expire(&self) -> Duration {
        Duration::from_secs(self.default_expire_secs)
    }

    pub fn dtmf_duration(&self) -> Option<Duration> {
        self.dtmf_duration_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> PhoneResult<()> {
        if self.local_party.trim().is_empty() {
            return Err(PhoneError::invalid_configuration("local_party", "must not be empty"));
        }
        if self.registration_timeout_secs == 0 {
            return Err(PhoneError::invalid_configuration(
                "registration_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.default_expire_secs == 0 {
            return Err(PhoneError::invalid_configuration(
                "default_expire_secs",
                "must be greater than zero",
            ));
        }
        if let Some(level) = self.debug_level {
            if level > MAX_DEBUG_LEVEL {
                return Err(PhoneError::invalid_configuration(
                    "debug_level",
                    format!("{} is above the maximum of {}", level, MAX_DEBUG_LEVEL),
                ));
            }
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}
