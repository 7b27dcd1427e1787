//! # softphone-core
//!
//! Call-control and registration state model for softphones built on an
//! external SIP signaling engine.
//!
//! The engine (SIP transactions, RTP, codecs, NAT traversal) sits behind the
//! [`SignalingEngine`] trait. This crate tracks what the engine is doing on
//! the application's behalf:
//!
//! - **Calls** - token-addressed setup, establishment, clearing with a typed
//!   [`EndReason`], DTMF injection ([`CallController`])
//! - **Registrations** - per address-of-record register, confirmation,
//!   refresh and unregister, with status-code classification
//!   ([`RegistrationController`])
//! - **Events** - ordered, lossless delivery of lifecycle notifications
//!   ([`EventDispatcher`])
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use softphone_core::{ConnectionOptions, EndReason, PhoneEvent, RegistrationParams, Session, SessionConfig, SignalingEngine};
//! use softphone_core::events::EventFilter;
//! use std::sync::Arc;
//!
//! # async fn example(engine: Arc<dyn SignalingEngine>) -> softphone_core::PhoneResult<()> {
//! let session = Session::start(engine, SessionConfig::new()).await?;
//! let mut events = session.events().subscribe_stream(EventFilter::all());
//!
//! let (aor, status) = session
//!     .registrations()
//!     .register(RegistrationParams::new("alice", "example.com").with_credentials("alice", "secret"))
//!     .await?;
//! println!("{} registered: {}", aor, status);
//!
//! let token = session
//!     .calls()
//!     .setup_call(None, "sip:bob@example.com".to_string(), ConnectionOptions::default())
//!     .await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         PhoneEvent::CallEstablished { token: t } if t == token => {
//!             session.calls().send_dtmf(&token, '5').await?;
//!             session.calls().clear_call(&token, EndReason::LocalUser).await?;
//!         }
//!         PhoneEvent::CallCleared { end_reason, .. } => {
//!             println!("call ended: {}", end_reason);
//!             break;
//!         }
//!         _ => {}
//!     }
//! }
//!
//! session.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod end_reason;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod registration;
pub mod session;
pub mod status;

pub use call::{CallDirection, CallInfo, CallState, CallStats, CallToken, ConnectionOptions, DtmfTone};
pub use end_reason::EndReason;
pub use engine::{EngineError, EngineEventSink, EngineRegistration, NatType, ProductInfo, SignalingEngine};
pub use error::{CallError, PhoneError, PhoneResult, RegError};
pub use events::{EventDispatcher, EventFilter, EventKind, EventStream, PhoneEvent, PhoneEventHandler};
pub use registration::{
    AddressOfRecord, CompatibilityMode, RegistrationInfo, RegistrationMode, RegistrationParams, RegistrationState,
    RetryInterval,
};
pub use session::calls::CallController;
pub use session::config::SessionConfig;
pub use session::pending::PendingOperation;
pub use session::registration::RegistrationController;
pub use session::{Session, SessionBuilder};
pub use status::{band_of, Band, StatusCode, UnlistedCode};
