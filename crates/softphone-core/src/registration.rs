//! Registration value types
//!
//! This module provides the parameters, states and snapshots used by the
//! registration controller. All actual REGISTER traffic is delegated to the
//! signaling engine.
//!
//! # Registration Process
//!
//! 1. **Resolution** - the address of record is resolved from record + registrar domain
//! 2. **Registration** - the engine sends REGISTER and reports status codes
//! 3. **Maintenance** - the engine refreshes before `expire_interval` lapses
//! 4. **Termination** - the caller unregisters, or the session shuts down
//!
//! ```rust
//! use softphone_core::registration::{RegistrationParams, RetryInterval};
//! use std::time::Duration;
//!
//! let params = RegistrationParams::new("alice", "example.com")
//!     .with_credentials("alice", "secret")
//!     .with_realm("example.com")
//!     .with_expire_interval(Duration::from_secs(1800))
//!     .with_retry_interval(RetryInterval::from_secs(30), RetryInterval::Infinite);
//!
//! assert_eq!(params.resolve_address_of_record().unwrap().as_str(), "alice@example.com");
//! assert_eq!(params.max_retry_interval.as_millis(), u64::MAX);
//! ```

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PhoneError, PhoneResult};
use crate::status::StatusCode;

/// Logical identity being registered, e.g. `alice@example.com`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressOfRecord(String);

impl AddressOfRecord {
    /// Resolve an address of record from a record and a registrar domain.
    ///
    /// A record that already carries a domain part (`user@host`) is used as
    /// is. Otherwise the registrar domain is appended, keeping any URI
    /// scheme on the record.
    pub fn resolve(record: &str, registrar_domain: &str) -> PhoneResult<Self> {
        let record = record.trim();
        if record.is_empty() {
            return Err(PhoneError::invalid_address_of_record("record is empty"));
        }
        if record.contains('@') {
            return Ok(Self(record.to_string()));
        }

        let domain = registrar_domain.trim();
        let domain = ["sips:", "sip:"]
            .iter()
            .find_map(|scheme| domain.strip_prefix(scheme))
            .unwrap_or(domain);
        if domain.is_empty() {
            return Err(PhoneError::invalid_address_of_record(format!(
                "record '{}' has no domain part and no registrar domain was given",
                record
            )));
        }

        Ok(Self(format!("{}@{}", record, domain)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AddressOfRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AddressOfRecord {
    fn from(aor: &str) -> Self {
        Self(aor.to_string())
    }
}

impl From<String> for AddressOfRecord {
    fn from(aor: String) -> Self {
        Self(aor)
    }
}

/// Retry interval bound; `Infinite` means no ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryInterval {
    Finite(Duration),
    Infinite,
}

impl RetryInterval {
    pub fn from_secs(secs: u64) -> Self {
        RetryInterval::Finite(Duration::from_secs(secs))
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, RetryInterval::Infinite)
    }

    /// Milliseconds for engines that take an integer; saturates at `u64::MAX`
    pub fn as_millis(&self) -> u64 {
        match self {
            RetryInterval::Finite(d) => u64::try_from(d.as_millis()).unwrap_or(u64::MAX),
            RetryInterval::Infinite => u64::MAX,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            RetryInterval::Finite(d) => Some(*d),
            RetryInterval::Infinite => None,
        }
    }
}

impl PartialOrd for RetryInterval {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RetryInterval {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (RetryInterval::Infinite, RetryInterval::Infinite) => Ordering::Equal,
            (RetryInterval::Infinite, _) => Ordering::Greater,
            (_, RetryInterval::Infinite) => Ordering::Less,
            (RetryInterval::Finite(a), RetryInterval::Finite(b)) => a.cmp(b),
        }
    }
}

/// Registrar quirks the engine should work around
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompatibilityMode {
    #[default]
    FullyCompliant,
    CannotRegisterMultipleContacts,
    CannotRegisterPrivateContacts,
    HasApplicationLayerGateway,
    Rfc5626,
}

/// How `register` reports its outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationMode {
    /// Wait for the first confirmation or failure
    #[default]
    Synchronous,
    /// Return once the record is resolved; status arrives as an event
    Asynchronous,
}

/// Parameters of a register request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationParams {
    /// User part or full address of record
    pub record: String,
    /// Registrar host, appended to `record` when it lacks a domain part
    pub registrar_domain: String,
    pub auth_identity: Option<String>,
    pub credential: Option<String>,
    pub realm: Option<String>,
    /// Outbound proxy, if any
    pub proxy: Option<String>,
    /// `None` uses the session's default expiry
    pub expire_interval: Option<Duration>,
    pub min_retry_interval: RetryInterval,
    pub max_retry_interval: RetryInterval,
    pub compatibility_mode: CompatibilityMode,
    pub mode: RegistrationMode,
}

impl RegistrationParams {
    pub fn new(record: impl Into<String>, registrar_domain: impl Into<String>) -> Self {
        Self {
            record: record.into(),
            registrar_domain: registrar_domain.into(),
            auth_identity: None,
            credential: None,
            realm: None,
            proxy: None,
            expire_interval: None,
            min_retry_interval: RetryInterval::from_secs(30),
            max_retry_interval: RetryInterval::from_secs(1800),
            compatibility_mode: CompatibilityMode::default(),
            mode: RegistrationMode::default(),
        }
    }

    pub fn with_credentials(mut self, auth_identity: impl Into<String>, credential: impl Into<String>) -> Self {
        self.auth_identity = Some(auth_identity.into());
        self.credential = Some(credential.into());
        self
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_expire_interval(mut self, expire: Duration) -> Self {
        self.expire_interval = Some(expire);
        self
    }

    pub fn with_retry_interval(mut self, min: RetryInterval, max: RetryInterval) -> Self {
        self.min_retry_interval = min;
        self.max_retry_interval = max;
        self
    }

    pub fn with_compatibility_mode(mut self, mode: CompatibilityMode) -> Self {
        self.compatibility_mode = mode;
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.mode = RegistrationMode::Asynchronous;
        self
    }

    pub fn resolve_address_of_record(&self) -> PhoneResult<AddressOfRecord> {
        AddressOfRecord::resolve(&self.record, &self.registrar_domain)
    }

    /// Check interval consistency
    pub fn validate(&self) -> PhoneResult<()> {
        if self.min_retry_interval > self.max_retry_interval {
            return Err(PhoneError::invalid_configuration(
                "min_retry_interval",
                "must not exceed max_retry_interval",
            ));
        }
        if self.expire_interval == Some(Duration::ZERO) {
            return Err(PhoneError::invalid_configuration(
                "expire_interval",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Lifecycle of one registration
///
/// `Idle -> Registering -> {Confirmed | Failed}`,
/// `Confirmed -> ReRegistering -> {Confirmed | Failed}`, and any state to
/// `Unregistered` on explicit unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationState {
    Idle,
    Registering,
    Confirmed,
    Failed,
    ReRegistering,
    Unregistered,
}

impl RegistrationState {
    /// In flight or confirmed
    pub fn is_optimistically_registered(&self) -> bool {
        matches!(
            self,
            RegistrationState::Registering | RegistrationState::Confirmed | RegistrationState::ReRegistering
        )
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationState::Idle => write!(f, "Idle"),
            RegistrationState::Registering => write!(f, "Registering"),
            RegistrationState::Confirmed => write!(f, "Confirmed"),
            RegistrationState::Failed => write!(f, "Failed"),
            RegistrationState::ReRegistering => write!(f, "Re-registering"),
            RegistrationState::Unregistered => write!(f, "Unregistered"),
        }
    }
}

/// Snapshot of a tracked registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationInfo {
    pub address_of_record: AddressOfRecord,
    pub state: RegistrationState,
    pub last_status: Option<StatusCode>,
    pub expire_interval: Duration,
    pub created_at: DateTime<Utc>,
    /// First confirmation
    pub registered_at: Option<DateTime<Utc>>,
    /// Latest confirmation, initial or refresh
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl RegistrationInfo {
    /// A confirmation whose expiry has lapsed without a refresh
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        match self.refreshed_at {
            Some(refreshed) => match chrono::Duration::from_std(self.expire_interval) {
                Ok(expire) => refreshed
                    .checked_add_signed(expire)
                    .map(|deadline| deadline < now)
                    .unwrap_or(false),
                Err(_) => false,
            },
            None => true,
        }
    }
}

/// Counters kept by the registration controller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationStats {
    pub total_registrations: usize,
    pub confirmed_registrations: usize,
    pub failed_registrations: usize,
}
