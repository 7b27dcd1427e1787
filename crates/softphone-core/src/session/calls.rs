//! Call operations
//!
//! [`CallController`] owns the table of live calls. Each call is an
//! independently lockable record, so operations on different tokens never
//! contend, and no lock is held while the signaling engine is called.
//!
//! ```text
//!  setup_call ──► Setup ──(engine: established)──► Established
//!                   │                                   │
//!                   └──────(engine: cleared)────────────┴──► Cleared ──► removed
//! ```
//!
//! A cleared token is remembered for a while after its record is removed,
//! so an engine notification that overtakes `setup_call` cannot bring the
//! call back to life.
//!
//! Every operation is safe to call from any task or thread.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use url::Url;

use crate::call::{CallDirection, CallInfo, CallState, CallStats, CallToken, ConnectionOptions, DtmfTone};
use crate::end_reason::EndReason;
use crate::engine::SignalingEngine;
use crate::error::{CallError, PhoneError, PhoneResult};
use crate::events::EventDispatcher;

/// One tracked call; the mutex serializes mutation of that call only
pub(crate) type CallRecord = Arc<Mutex<CallEntry>>;

pub(crate) struct CallEntry {
    pub(crate) info: CallInfo,
    /// Created by an engine notification before `setup_call` returned
    pub(crate) adopted: bool,
}

impl CallEntry {
    pub(crate) fn new(token: CallToken, party_a: String, party_b: String, direction: CallDirection, adopted: bool) -> Self {
        Self {
            info: CallInfo {
                token,
                party_a,
                party_b,
                direction,
                state: CallState::Setup,
                end_reason: None,
                created_at: Utc::now(),
                established_at: None,
                cleared_at: None,
            },
            adopted,
        }
    }
}

#[derive(Default)]
pub(crate) struct CallCounters {
    pub(crate) total: AtomicU64,
    pub(crate) established: AtomicU64,
    pub(crate) cleared: AtomicU64,
}

/// How many cleared tokens are remembered after their records are gone
pub(crate) const CLEARED_TOKEN_HISTORY: usize = 256;

/// Bounded FIFO set of recently cleared tokens
#[derive(Default)]
pub(crate) struct ClearedTokens {
    order: VecDeque<CallToken>,
    tokens: HashSet<CallToken>,
}

impl ClearedTokens {
    fn insert(&mut self, token: &CallToken) {
        if !self.tokens.insert(token.clone()) {
            return;
        }
        self.order.push_back(token.clone());
        if self.order.len() > CLEARED_TOKEN_HISTORY {
            if let Some(oldest) = self.order.pop_front() {
                self.tokens.remove(&oldest);
            }
        }
    }

    fn contains(&self, token: &CallToken) -> bool {
        self.tokens.contains(token)
    }
}

/// State shared between the controller and the engine bridge
pub(crate) struct CallTable {
    pub(crate) calls: DashMap<CallToken, CallRecord>,
    pub(crate) counters: CallCounters,
    pub(crate) dispatcher: Arc<EventDispatcher>,
    pub(crate) local_party: String,
    cleared: Mutex<ClearedTokens>,
}

impl CallTable {
    pub(crate) fn new(dispatcher: Arc<EventDispatcher>, local_party: String) -> Self {
        Self {
            calls: DashMap::new(),
            counters: CallCounters::default(),
            dispatcher,
            local_party,
            cleared: Mutex::new(ClearedTokens::default()),
        }
    }

    pub(crate) fn mark_cleared(&self, token: &CallToken) {
        self.cleared.lock().insert(token);
    }

    pub(crate) fn was_cleared(&self, token: &CallToken) -> bool {
        self.cleared.lock().contains(token)
    }

    /// Record for a token, with the shard guard already released
    pub(crate) fn record(&self, token: &CallToken) -> Option<CallRecord> {
        self.calls.get(token).map(|entry| entry.value().clone())
    }

    fn live_record(&self, token: &CallToken) -> PhoneResult<CallRecord> {
        match self.record(token) {
            Some(record) if record.lock().info.state.is_live() => Ok(record),
            _ => Err(PhoneError::unknown_token(token)),
        }
    }
}

/// Token-addressed call control on top of a [`SignalingEngine`]
#[derive(Clone)]
pub struct CallController {
    table: Arc<CallTable>,
    engine: Arc<dyn SignalingEngine>,
    dtmf_duration: Option<Duration>,
    legacy_call: Arc<Mutex<Option<CallToken>>>,
}

impl CallController {
    pub(crate) fn new(table: Arc<CallTable>, engine: Arc<dyn SignalingEngine>, dtmf_duration: Option<Duration>) -> Self {
        Self {
            table,
            engine,
            dtmf_duration,
            legacy_call: Arc::new(Mutex::new(None)),
        }
    }

    /// Start an outbound call
    ///
    /// An empty or missing `party_a` is replaced by the session's local
    /// placeholder address. The returned token identifies the call until its
    /// cleared notification has been dispatched. If the engine reports the
    /// call cleared before setup returns, the token is still returned but
    /// every further operation on it yields `UnknownToken`.
    ///
    /// # Errors
    ///
    /// * `InvalidDestination` - `party_b` is empty, contains whitespace, or
    ///   carries a scheme but is not a valid URL
    /// * `EngineFailure` - the engine refused the setup
    /// * `CallAlreadyExists` - the engine handed out a token that is still live
    pub async fn setup_call(
        &self,
        party_a: Option<String>,
        party_b: String,
        options: ConnectionOptions,
    ) -> Result<CallToken, CallError> {
        validate_destination(&party_b)?;

        let party_a = match party_a {
            Some(a) if !a.trim().is_empty() => a,
            _ => self.table.local_party.clone(),
        };

        let token = self
            .engine
            .setup_call(&party_a, &party_b, &options)
            .await
            .map_err(|e| {
                tracing::error!(party_a = %party_a, party_b = %party_b, error = %e, "Call setup failed");
                PhoneError::from(e)
            })?;

        let existing = match self.table.calls.entry(token.clone()) {
            Entry::Occupied(occupied) => Some(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                if self.table.was_cleared(&token) {
                    None
                } else {
                    vacant.insert(Arc::new(Mutex::new(CallEntry::new(
                        token.clone(),
                        party_a.clone(),
                        party_b.clone(),
                        CallDirection::Outgoing,
                        false,
                    ))));
                    self.table.counters.total.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(token = %token, party_a = %party_a, party_b = %party_b, "Call setup started");
                    return Ok(token);
                }
            }
        };

        let Some(record) = existing else {
            self.table.counters.total.fetch_add(1, Ordering::Relaxed);
            tracing::info!(token = %token, party_b = %party_b, "Call cleared before setup returned");
            return Ok(token);
        };

        {
            let mut entry = record.lock();
            if entry.info.state == CallState::Cleared {
                self.table.counters.total.fetch_add(1, Ordering::Relaxed);
                tracing::info!(token = %token, party_b = %party_b, "Call cleared before setup returned");
                return Ok(token);
            }
            if !entry.adopted {
                tracing::warn!(token = %token, "Engine reused a live call token");
                return Err(PhoneError::CallAlreadyExists { token });
            }
            // the engine reported on this call before setup returned
            entry.info.party_a = party_a.clone();
            entry.info.party_b = party_b.clone();
            entry.info.direction = CallDirection::Outgoing;
            entry.adopted = false;
        }

        self.table.counters.total.fetch_add(1, Ordering::Relaxed);
        tracing::info!(token = %token, party_a = %party_a, party_b = %party_b, "Call setup started");
        Ok(token)
    }

    /// Legacy single-call setup without a returned token
    ///
    /// Refuses to start a second call while the previous one is live. The
    /// token of the call it started is available from [`legacy_call_token`].
    ///
    /// [`legacy_call_token`]: CallController::legacy_call_token
    #[deprecated(note = "use setup_call, which supports multiple calls and returns a token")]
    pub async fn make_call(&self, party_a: Option<String>, party_b: String) -> bool {
        if let Some(current) = self.legacy_call_token() {
            tracing::warn!(token = %current, "make_call refused: a call is already active");
            return false;
        }
        match self.setup_call(party_a, party_b, ConnectionOptions::default()).await {
            Ok(token) => {
                *self.legacy_call.lock() = Some(token);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "make_call failed");
                false
            }
        }
    }

    /// Token of the live call started by `make_call`, if any
    pub fn legacy_call_token(&self) -> Option<CallToken> {
        let mut current = self.legacy_call.lock();
        let live = current
            .as_ref()
            .and_then(|token| self.table.record(token))
            .map(|record| record.lock().info.state.is_live())
            .unwrap_or(false);
        if !live {
            *current = None;
        }
        current.clone()
    }

    /// Whether the call is established with media flowing
    ///
    /// The answer may change at any time after it is returned.
    pub fn is_established(&self, token: &CallToken) -> bool {
        let Some(record) = self.table.record(token) else {
            return false;
        };
        let established = record.lock().info.state == CallState::Established;
        established && self.engine.is_call_established(token)
    }

    /// Ask the engine to tear a call down
    ///
    /// Returns once the engine has accepted the request; the call is removed
    /// when the engine reports it cleared. A token that is unknown or already
    /// cleared yields `UnknownToken`.
    pub async fn clear_call(&self, token: &CallToken, reason: EndReason) -> Result<(), CallError> {
        self.table.live_record(token)?;

        match self.engine.clear_call(token, reason).await {
            Ok(true) => {
                tracing::info!(token = %token, reason = %reason, "Call clearing requested");
                Ok(())
            }
            Ok(false) => {
                tracing::warn!(token = %token, "Engine has no connection for call");
                Err(PhoneError::unknown_token(token))
            }
            Err(e) => {
                tracing::error!(token = %token, error = %e, "Clear call failed");
                Err(e.into())
            }
        }
    }

    /// Inject a DTMF tone
    ///
    /// The tone is validated before the engine is contacted.
    pub async fn send_dtmf(&self, token: &CallToken, tone: char) -> Result<(), CallError> {
        let tone = DtmfTone::parse(tone)?;
        self.table.live_record(token)?;

        self.engine
            .send_tone(token, tone, self.dtmf_duration)
            .await
            .map_err(|e| {
                tracing::warn!(token = %token, tone = %tone.as_char(), error = %e, "Sending DTMF failed");
                PhoneError::from(e)
            })?;

        tracing::debug!(token = %token, tone = %tone.as_char(), "DTMF sent");
        Ok(())
    }

    fn ringing_incoming(&self, token: &CallToken) -> PhoneResult<CallRecord> {
        let record = self.table.live_record(token)?;
        {
            let entry = record.lock();
            if entry.info.direction != CallDirection::Incoming || entry.info.state != CallState::Setup {
                return Err(PhoneError::NotIncoming { token: token.clone() });
            }
        }
        Ok(record)
    }

    /// Answer a ringing inbound call
    pub async fn accept_incoming(&self, token: &CallToken) -> Result<(), CallError> {
        self.ringing_incoming(token)?;
        self.engine.accept_incoming(token).await?;
        tracing::info!(token = %token, "Incoming call accepted");
        Ok(())
    }

    /// Refuse a ringing inbound call
    pub async fn reject_incoming(&self, token: &CallToken, reason: EndReason) -> Result<(), CallError> {
        self.ringing_incoming(token)?;
        self.engine.reject_incoming(token, reason).await?;
        tracing::info!(token = %token, reason = %reason, "Incoming call rejected");
        Ok(())
    }

    pub fn call_info(&self, token: &CallToken) -> PhoneResult<CallInfo> {
        self.table
            .record(token)
            .map(|record| record.lock().info.clone())
            .ok_or_else(|| PhoneError::unknown_token(token))
    }

    /// Snapshots of every call that has not cleared
    pub fn active_calls(&self) -> Vec<CallInfo> {
        let records: Vec<CallRecord> = self.table.calls.iter().map(|e| e.value().clone()).collect();
        let mut calls: Vec<CallInfo> = records
            .iter()
            .map(|record| record.lock().info.clone())
            .filter(|info| info.state.is_live())
            .collect();
        calls.sort_by_key(|info| info.created_at);
        calls
    }

    pub fn stats(&self) -> CallStats {
        let counters = &self.table.counters;
        CallStats {
            total_calls: counters.total.load(Ordering::Relaxed),
            established_calls: counters.established.load(Ordering::Relaxed),
            cleared_calls: counters.cleared.load(Ordering::Relaxed),
            active_calls: self.active_calls().len(),
        }
    }
}

/// Reject empty, whitespace-laden or malformed destinations
fn validate_destination(party_b: &str) -> PhoneResult<()> {
    if party_b.trim().is_empty() {
        return Err(PhoneError::invalid_destination(party_b, "destination is empty"));
    }
    if party_b.chars().any(char::is_whitespace) {
        return Err(PhoneError::invalid_destination(party_b, "destination contains whitespace"));
    }
    if has_scheme(party_b) {
        Url::parse(party_b).map_err(|e| PhoneError::invalid_destination(party_b, e.to_string()))?;
    }
    Ok(())
}

/// `scheme:rest` where scheme is `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`
fn has_scheme(address: &str) -> bool {
    match address.split_once(':') {
        Some((scheme, rest)) => {
            !rest.is_empty()
                && scheme.chars().next().map_or(false, |c| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}
