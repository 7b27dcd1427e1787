//! Event dispatch for call and registration lifecycle notifications
//!
//! The controllers publish a [`PhoneEvent`] for every state transition the
//! engine reports. Subscribers either register an async
//! [`PhoneEventHandler`], served by its own delivery task, or pull events
//! from an [`EventStream`].
//!
//! # Delivery Guarantees
//!
//! - Every subscriber owns an unbounded FIFO queue, so publishing never
//!   blocks the engine thread and never drops an event.
//! - Publication is serialized: all subscribers observe events in the order
//!   the engine produced them.
//! - A subscriber whose queue has been closed is pruned on the next publish.
//!
//! # Usage Examples
//!
//! ## Handler
//!
//! ```rust
//! use softphone_core::events::{EventDispatcher, EventFilter, PhoneEventHandler};
//! use softphone_core::{CallToken, EndReason};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Logger;
//!
//! #[async_trait]
//! impl PhoneEventHandler for Logger {
//!     async fn on_call_cleared(&self, token: CallToken, peer_name: String, end_reason: EndReason) {
//!         println!("{} with {} ended: {}", token, peer_name, end_reason);
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let dispatcher = EventDispatcher::new();
//! let id = dispatcher.subscribe(Arc::new(Logger), EventFilter::all()).unwrap();
//! assert_eq!(dispatcher.subscriber_count(), 1);
//! assert!(dispatcher.unsubscribe(id));
//! # }
//! ```
//!
//! ## Stream
//!
//! ```rust
//! use softphone_core::events::{EventDispatcher, EventFilter, EventKind, PhoneEvent};
//! use softphone_core::CallToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let dispatcher = EventDispatcher::new();
//! let mut stream = dispatcher.subscribe_stream(EventFilter::kinds([EventKind::CallEstablished]));
//!
//! dispatcher.publish(PhoneEvent::CallEstablished { token: CallToken::from("c1") });
//! assert_eq!(stream.recv().await.unwrap().kind(), EventKind::CallEstablished);
//! # }
//! ```

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::call::CallToken;
use crate::end_reason::EndReason;
use crate::error::{PhoneError, PhoneResult};
use crate::registration::AddressOfRecord;
use crate::status::StatusCode;

/// Lifecycle notification delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhoneEvent {
    /// A call reached the established state
    CallEstablished { token: CallToken },
    /// A call was torn down; `peer_name` is `party_b`, or `party_a` when
    /// `party_b` is empty
    CallCleared {
        token: CallToken,
        peer_name: String,
        end_reason: EndReason,
    },
    /// A non-suppressed registration status arrived
    RegistrationStatus {
        address_of_record: AddressOfRecord,
        was_registering: bool,
        status_code: StatusCode,
    },
    /// An inbound call is ringing and awaits accept or reject
    CallIncoming {
        token: CallToken,
        remote_name: String,
        remote_address: String,
    },
    /// The remote end of an outbound call is alerting
    CallOutgoing { remote_name: String },
}

/// Discriminant of [`PhoneEvent`], for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    CallEstablished,
    CallCleared,
    RegistrationStatus,
    CallIncoming,
    CallOutgoing,
}

impl PhoneEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PhoneEvent::CallEstablished { .. } => EventKind::CallEstablished,
            PhoneEvent::CallCleared { .. } => EventKind::CallCleared,
            PhoneEvent::RegistrationStatus { .. } => EventKind::RegistrationStatus,
            PhoneEvent::CallIncoming { .. } => EventKind::CallIncoming,
            PhoneEvent::CallOutgoing { .. } => EventKind::CallOutgoing,
        }
    }

    /// Token of the call this event concerns, if any
    pub fn token(&self) -> Option<&CallToken> {
        match self {
            PhoneEvent::CallEstablished { token }
            | PhoneEvent::CallCleared { token, .. }
            | PhoneEvent::CallIncoming { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn address_of_record(&self) -> Option<&AddressOfRecord> {
        match self {
            PhoneEvent::RegistrationStatus { address_of_record, .. } => Some(address_of_record),
            _ => None,
        }
    }
}

/// Selects which events a subscriber receives
///
/// `None` in a field means "no restriction". Token restrictions apply only
/// to call events; address-of-record restrictions only to registration
/// events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub kinds: Option<HashSet<EventKind>>,
    pub tokens: Option<HashSet<CallToken>>,
    pub addresses_of_record: Option<HashSet<AddressOfRecord>>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn for_call(token: CallToken) -> Self {
        Self {
            tokens: Some(HashSet::from([token])),
            ..Self::default()
        }
    }

    pub fn for_address_of_record(aor: AddressOfRecord) -> Self {
        Self {
            kinds: Some(HashSet::from([EventKind::RegistrationStatus])),
            addresses_of_record: Some(HashSet::from([aor])),
            ..Self::default()
        }
    }

    pub fn matches(&self, event: &PhoneEvent) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }
        if let (Some(tokens), Some(token)) = (&self.tokens, event.token()) {
            if !tokens.contains(token) {
                return false;
            }
        }
        if let (Some(aors), Some(aor)) = (&self.addresses_of_record, event.address_of_record()) {
            if !aors.contains(aor) {
                return false;
            }
        }
        true
    }
}

/// Async receiver of lifecycle events
///
/// Every method has a no-op default. Override [`on_phone_event`] to see
/// events in their tagged form.
///
/// [`on_phone_event`]: PhoneEventHandler::on_phone_event
#[async_trait]
pub trait PhoneEventHandler: Send + Sync {
    async fn on_call_established(&self, _token: CallToken) {}

    async fn on_call_cleared(&self, _token: CallToken, _peer_name: String, _end_reason: EndReason) {}

    async fn on_registration_status(
        &self,
        _address_of_record: AddressOfRecord,
        _was_registering: bool,
        _status_code: StatusCode,
    ) {
    }

    async fn on_call_incoming(&self, _token: CallToken, _remote_name: String, _remote_address: String) {}

    async fn on_call_outgoing(&self, _remote_name: String) {}

    /// Route an event to the matching method
    async fn on_phone_event(&self, event: PhoneEvent) {
        match event {
            PhoneEvent::CallEstablished { token } => self.on_call_established(token).await,
            PhoneEvent::CallCleared {
                token,
                peer_name,
                end_reason,
            } => self.on_call_cleared(token, peer_name, end_reason).await,
            PhoneEvent::RegistrationStatus {
                address_of_record,
                was_registering,
                status_code,
            } => {
                self.on_registration_status(address_of_record, was_registering, status_code)
                    .await
            }
            PhoneEvent::CallIncoming {
                token,
                remote_name,
                remote_address,
            } => self.on_call_incoming(token, remote_name, remote_address).await,
            PhoneEvent::CallOutgoing { remote_name } => self.on_call_outgoing(remote_name).await,
        }
    }
}

struct Subscriber {
    id: Uuid,
    filter: EventFilter,
    tx: mpsc::UnboundedSender<PhoneEvent>,
}

/// Fan-out of lifecycle events to subscribers
pub struct EventDispatcher {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn add(&self, filter: EventFilter) -> (Uuid, mpsc::UnboundedReceiver<PhoneEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.subscribers.lock().push(Subscriber { id, filter, tx });
        (id, rx)
    }

    /// Subscribe a handler; requires a running tokio runtime
    ///
    /// The handler is driven by its own task, which ends once the
    /// subscription is removed and its queue is drained.
    pub fn subscribe(&self, handler: Arc<dyn PhoneEventHandler>, filter: EventFilter) -> PhoneResult<Uuid> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PhoneError::internal_error(format!("no tokio runtime for event delivery: {}", e)))?;

        let (id, mut rx) = self.add(filter);
        runtime.spawn(async move {
            while let Some(event) = rx.recv().await {
                handler.on_phone_event(event).await;
            }
            tracing::debug!(subscription = %id, "Event delivery task finished");
        });

        tracing::debug!(subscription = %id, "Handler subscribed");
        Ok(id)
    }

    /// Subscribe with a pull-based stream
    pub fn subscribe_stream(&self, filter: EventFilter) -> EventStream {
        let (id, rx) = self.add(filter);
        tracing::debug!(subscription = %id, "Stream subscribed");
        EventStream { id, rx }
    }

    /// Returns `true` if the subscription existed
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        before != subscribers.len()
    }

    /// Number of subscribers whose queue is still open
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().iter().filter(|s| !s.tx.is_closed()).count()
    }

    /// Enqueue an event for every matching subscriber
    pub fn publish(&self, event: PhoneEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| {
            if !s.filter.matches(&event) {
                return !s.tx.is_closed();
            }
            match s.tx.send(event.clone()) {
                Ok(()) => true,
                Err(_) => {
                    tracing::debug!(subscription = %s.id, "Pruning closed subscriber");
                    false
                }
            }
        });
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull-based subscription
///
/// Dropping the stream ends the subscription.
pub struct EventStream {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<PhoneEvent>,
}

impl EventStream {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event, or `None` once the dispatcher has dropped this subscription
    pub async fn recv(&mut self) -> Option<PhoneEvent> {
        self.rx.recv().await
    }

    /// Next queued event without waiting
    pub fn try_recv(&mut self) -> Option<PhoneEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = PhoneEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
