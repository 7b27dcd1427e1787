//! Engine bridge
//!
//! [`EngineBridge`] receives the signaling engine's notifications, applies
//! them to the call and registration tables, and publishes the resulting
//! lifecycle events. It holds the shared tables and the dispatcher only,
//! never the engine, so the engine's reference to it creates no cycle.
//!
//! Each notification mutates exactly one record under that record's lock
//! and publishes while still holding it, so events for one call or one
//! address of record are dispatched in the order the engine produced them.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;

use crate::call::{CallDirection, CallState, CallToken};
use crate::end_reason::EndReason;
use crate::engine::EngineEventSink;
use crate::events::PhoneEvent;
use crate::registration::{AddressOfRecord, RegistrationState};
use crate::session::calls::{CallEntry, CallTable};
use crate::session::registration::RegistrationTable;
use crate::status::StatusCode;

pub(crate) struct EngineBridge {
    calls: Arc<CallTable>,
    registrations: Arc<RegistrationTable>,
}

/// Intermediate protocol chatter that must not reach subscribers
///
/// Codes below 200, or below 300 while re-registering, are suppressed. Local
/// codes sit below 100 and fall under the same rule.
pub(crate) fn is_suppressed(status: StatusCode, re_registering: bool) -> bool {
    let code = status.as_u16();
    code < 200 || (re_registering && code < 300)
}

impl EngineBridge {
    pub(crate) fn new(calls: Arc<CallTable>, registrations: Arc<RegistrationTable>) -> Self {
        Self { calls, registrations }
    }
}

impl EngineEventSink for EngineBridge {
    fn on_call_established(&self, token: &CallToken) {
        let record = match self.calls.calls.entry(token.clone()) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                if self.calls.was_cleared(token) {
                    tracing::debug!(token = %token, "Ignoring established notification for a cleared call");
                    return;
                }
                tracing::debug!(token = %token, "Established notification for a call not yet tracked");
                vacant
                    .insert(Arc::new(Mutex::new(CallEntry::new(
                        token.clone(),
                        String::new(),
                        String::new(),
                        CallDirection::Outgoing,
                        true,
                    ))))
                    .value()
                    .clone()
            }
        };

        let mut entry = record.lock();
        match entry.info.state {
            CallState::Setup => {
                entry.info.state = CallState::Established;
                entry.info.established_at = Some(Utc::now());
                self.calls.counters.established.fetch_add(1, Ordering::Relaxed);
                tracing::info!(token = %token, "Call established");
                self.calls.dispatcher.publish(PhoneEvent::CallEstablished { token: token.clone() });
            }
            state => {
                tracing::debug!(token = %token, state = %state, "Ignoring repeated established notification");
            }
        }
    }

    fn on_call_cleared(&self, token: &CallToken, party_a: &str, party_b: &str, end_reason_code: u32) {
        let end_reason = EndReason::from_code(end_reason_code);
        if end_reason.describe().is_none() {
            tracing::warn!(token = %token, code = end_reason_code, "Call cleared with an uncatalogued end reason");
        }

        let pick_peer = |a: &str, b: &str| if b.is_empty() { a.to_string() } else { b.to_string() };

        let record = match self.calls.calls.entry(token.clone()) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(_) => {
                if self.calls.was_cleared(token) {
                    tracing::debug!(token = %token, "Ignoring repeated cleared notification");
                    return;
                }
                // setup_call may still be on its way back with this token
                self.calls.mark_cleared(token);
                self.calls.counters.cleared.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(token = %token, reason = %end_reason, "Cleared notification for an untracked call");
                self.calls.dispatcher.publish(PhoneEvent::CallCleared {
                    token: token.clone(),
                    peer_name: pick_peer(party_a, party_b),
                    end_reason,
                });
                return;
            }
        };

        {
            let mut entry = record.lock();
            if entry.info.state == CallState::Cleared {
                tracing::debug!(token = %token, "Ignoring repeated cleared notification");
                return;
            }
            entry.info.state = CallState::Cleared;
            entry.info.end_reason = Some(end_reason);
            entry.info.cleared_at = Some(Utc::now());
            self.calls.counters.cleared.fetch_add(1, Ordering::Relaxed);
            self.calls.mark_cleared(token);

            let peer_name = if party_a.is_empty() && party_b.is_empty() {
                pick_peer(&entry.info.party_a, &entry.info.party_b)
            } else {
                pick_peer(party_a, party_b)
            };

            tracing::info!(token = %token, peer = %peer_name, reason = %end_reason, "Call cleared");
            self.calls.dispatcher.publish(PhoneEvent::CallCleared {
                token: token.clone(),
                peer_name,
                end_reason,
            });
        }

        self.calls
            .calls
            .remove_if(token, |_, current| Arc::ptr_eq(current, &record));
    }

    fn on_registration_status(&self, aor: &str, was_registering: bool, re_registering: bool, status_code: u16) {
        let status = StatusCode::from_u16(status_code).unwrap_or_else(|| {
            tracing::warn!(aor = %aor, code = status_code, "Registration status outside any known range");
            StatusCode::IllegalStatusCode
        });
        let aor = AddressOfRecord::from(aor);
        let suppressed = is_suppressed(status, re_registering);
        let record = self.registrations.record(&aor).or_else(|| {
            if was_registering {
                self.registrations.adopt_in_flight(&aor)
            } else {
                None
            }
        });

        let Some(record) = record else {
            if suppressed {
                tracing::debug!(aor = %aor, status = status_code, "Suppressed status for an untracked registration");
            } else {
                tracing::debug!(aor = %aor, status = status_code, "Status for an untracked registration");
                self.registrations.dispatcher.publish(PhoneEvent::RegistrationStatus {
                    address_of_record: aor,
                    was_registering,
                    status_code: status,
                });
            }
            return;
        };

        let mut entry = record.lock();
        let now = Utc::now();

        if suppressed {
            if re_registering {
                if status.is_success() {
                    entry.info.state = RegistrationState::Confirmed;
                    entry.info.last_status = Some(status);
                    entry.info.refreshed_at = Some(now);
                    tracing::debug!(aor = %aor, "Registration refreshed");
                } else {
                    entry.info.state = RegistrationState::ReRegistering;
                    tracing::debug!(aor = %aor, status = status_code, "Re-registration in progress");
                }
            } else {
                if entry.info.state == RegistrationState::Idle {
                    entry.info.state = RegistrationState::Registering;
                }
                tracing::debug!(aor = %aor, status = status_code, "Suppressed intermediate registration status");
            }
            return;
        }

        entry.info.last_status = Some(status);
        if !was_registering {
            entry.info.state = RegistrationState::Unregistered;
        } else if status.is_success() {
            entry.info.state = RegistrationState::Confirmed;
            entry.info.registered_at.get_or_insert(now);
            entry.info.refreshed_at = Some(now);
        } else {
            entry.info.state = RegistrationState::Failed;
        }

        if let Some(waiter) = entry.waiter.take() {
            let _ = waiter.send(status);
        }

        tracing::info!(aor = %aor, state = %entry.info.state, status = status_code, "Registration status");
        self.registrations.dispatcher.publish(PhoneEvent::RegistrationStatus {
            address_of_record: aor.clone(),
            was_registering,
            status_code: status,
        });

        let unregistered = entry.info.state == RegistrationState::Unregistered;
        drop(entry);
        if unregistered {
            self.registrations
                .registrations
                .remove_if(&aor, |_, current| Arc::ptr_eq(current, &record));
        }
    }

    fn on_incoming_call(&self, token: &CallToken, remote_name: &str, remote_address: &str) {
        let mut inserted = false;
        let record = self
            .calls
            .calls
            .entry(token.clone())
            .or_insert_with(|| {
                inserted = true;
                Arc::new(Mutex::new(CallEntry::new(
                    token.clone(),
                    remote_address.to_string(),
                    self.calls.local_party.clone(),
                    CallDirection::Incoming,
                    false,
                )))
            })
            .value()
            .clone();

        if !inserted {
            tracing::warn!(token = %token, "Incoming call notification for a token already in use");
            return;
        }

        let _entry = record.lock();
        self.calls.counters.total.fetch_add(1, Ordering::Relaxed);
        tracing::info!(token = %token, remote = %remote_address, "Incoming call");
        self.calls.dispatcher.publish(PhoneEvent::CallIncoming {
            token: token.clone(),
            remote_name: remote_name.to_string(),
            remote_address: remote_address.to_string(),
        });
    }

    fn on_outgoing_call(&self, remote_name: &str) {
        tracing::debug!(remote = %remote_name, "Remote party alerting");
        self.calls.dispatcher.publish(PhoneEvent::CallOutgoing {
            remote_name: remote_name.to_string(),
        });
    }
}
