//! In-memory signaling engine for integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use softphone_core::engine::{EngineResult, EngineRegistration};
use softphone_core::events::{EventFilter, EventStream};
use softphone_core::{
    AddressOfRecord, CallToken, ConnectionOptions, DtmfTone, EndReason, EngineError, EngineEventSink, NatType,
    PhoneEvent, ProductInfo, Session, SessionConfig, SignalingEngine,
};

/// Every core -> engine request, in order
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    SetupCall { party_a: String, party_b: String },
    ClearCall { token: CallToken, reason: EndReason },
    SendTone { token: CallToken, tone: DtmfTone, duration: Option<Duration> },
    Register(EngineRegistration),
    Unregister(AddressOfRecord),
    StartListeners(Vec<String>),
    AcceptIncoming(CallToken),
    RejectIncoming(CallToken, EndReason),
    SetStunServer(String),
    SetTranslationHost(String),
    AddRouteEntry(String),
    SetProductInfo(ProductInfo),
    ShutdownEndpoints,
}

pub struct MockEngine {
    sink: Mutex<Option<Arc<dyn EngineEventSink>>>,
    log: Mutex<Vec<EngineCall>>,
    next_token: AtomicU64,
    /// Reported by `is_call_established` for every call
    pub media_flowing: AtomicBool,
    /// Reported by `is_registered`
    pub engine_registered: AtomicBool,
    /// Status fired from inside `register`, before it returns
    pub register_status: Mutex<Option<u16>>,
    /// Address the engine claims to have registered instead of the requested one
    pub registered_as: Mutex<Option<String>>,
    pub fail_setup: Mutex<Option<EngineError>>,
    /// Cleared notification fired from inside `setup_call`, before it returns
    pub clear_on_setup: Mutex<Option<EndReason>>,
    /// Whether `clear_call` fires the cleared notification before returning
    pub clear_fires_cleared: AtomicBool,
    pub fail_register: Mutex<Option<EngineError>>,
    pub fail_unregister: Mutex<Option<EngineError>>,
    pub register_delay: Mutex<Option<Duration>>,
    pub stun_delay: Mutex<Option<Duration>>,
    pub nat_type: Mutex<NatType>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sink: Mutex::new(None),
            log: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
            media_flowing: AtomicBool::new(true),
            engine_registered: AtomicBool::new(true),
            register_status: Mutex::new(None),
            registered_as: Mutex::new(None),
            fail_setup: Mutex::new(None),
            clear_on_setup: Mutex::new(None),
            clear_fires_cleared: AtomicBool::new(false),
            fail_register: Mutex::new(None),
            fail_unregister: Mutex::new(None),
            register_delay: Mutex::new(None),
            stun_delay: Mutex::new(None),
            nat_type: Mutex::new(NatType::Cone),
        })
    }

    fn record(&self, call: EngineCall) {
        self.log.lock().push(call);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.log.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.log.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn is_attached(&self) -> bool {
        self.sink.lock().is_some()
    }

    fn sink(&self) -> Arc<dyn EngineEventSink> {
        self.sink.lock().clone().expect("engine has no sink attached")
    }

    pub fn fire_established(&self, token: &CallToken) {
        self.sink().on_call_established(token);
    }

    pub fn fire_cleared(&self, token: &CallToken, party_a: &str, party_b: &str, reason: EndReason) {
        self.sink().on_call_cleared(token, party_a, party_b, reason.code());
    }

    pub fn fire_cleared_code(&self, token: &CallToken, party_a: &str, party_b: &str, code: u32) {
        self.sink().on_call_cleared(token, party_a, party_b, code);
    }

    pub fn fire_registration_status(&self, aor: &str, was_registering: bool, re_registering: bool, code: u16) {
        self.sink().on_registration_status(aor, was_registering, re_registering, code);
    }

    pub fn fire_incoming(&self, token: &CallToken, remote_name: &str, remote_address: &str) {
        self.sink().on_incoming_call(token, remote_name, remote_address);
    }

    pub fn fire_outgoing(&self, remote_name: &str) {
        self.sink().on_outgoing_call(remote_name);
    }
}

#[async_trait]
impl SignalingEngine for MockEngine {
    async fn setup_call(&self, party_a: &str, party_b: &str, _options: &ConnectionOptions) -> EngineResult<CallToken> {
        self.record(EngineCall::SetupCall {
            party_a: party_a.to_string(),
            party_b: party_b.to_string(),
        });
        if let Some(err) = self.fail_setup.lock().clone() {
            return Err(err);
        }
        let n = self.next_token.fetch_add(1, Ordering::SeqCst);
        let token = CallToken::new(format!("call-{}", n));
        let reason = *self.clear_on_setup.lock();
        if let Some(reason) = reason {
            self.fire_cleared(&token, party_a, party_b, reason);
        }
        Ok(token)
    }

    async fn clear_call(&self, token: &CallToken, reason: EndReason) -> EngineResult<bool> {
        self.record(EngineCall::ClearCall {
            token: token.clone(),
            reason,
        });
        if self.clear_fires_cleared.load(Ordering::SeqCst) {
            self.fire_cleared(token, "", "", reason);
        }
        Ok(true)
    }

    async fn send_tone(&self, token: &CallToken, tone: DtmfTone, duration: Option<Duration>) -> EngineResult<()> {
        self.record(EngineCall::SendTone {
            token: token.clone(),
            tone,
            duration,
        });
        Ok(())
    }

    async fn register(&self, request: &EngineRegistration) -> EngineResult<AddressOfRecord> {
        self.record(EngineCall::Register(request.clone()));
        let delay = *self.register_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.fail_register.lock().clone() {
            return Err(err);
        }
        let aor = match self.registered_as.lock().clone() {
            Some(aor) => AddressOfRecord::from(aor),
            None => request.address_of_record.clone(),
        };
        let status = *self.register_status.lock();
        if let Some(code) = status {
            self.fire_registration_status(aor.as_str(), true, false, code);
        }
        Ok(aor)
    }

    async fn unregister(&self, aor: &AddressOfRecord) -> EngineResult<bool> {
        self.record(EngineCall::Unregister(aor.clone()));
        if let Some(err) = self.fail_unregister.lock().clone() {
            return Err(err);
        }
        Ok(true)
    }

    async fn start_listeners(&self, interfaces: &[String]) -> EngineResult<bool> {
        self.record(EngineCall::StartListeners(interfaces.to_vec()));
        Ok(true)
    }

    fn is_call_established(&self, _token: &CallToken) -> bool {
        self.media_flowing.load(Ordering::SeqCst)
    }

    fn is_registered(&self, _aor: &AddressOfRecord, _check_offline: bool) -> bool {
        self.engine_registered.load(Ordering::SeqCst)
    }

    async fn accept_incoming(&self, token: &CallToken) -> EngineResult<()> {
        self.record(EngineCall::AcceptIncoming(token.clone()));
        Ok(())
    }

    async fn reject_incoming(&self, token: &CallToken, reason: EndReason) -> EngineResult<()> {
        self.record(EngineCall::RejectIncoming(token.clone(), reason));
        Ok(())
    }

    async fn set_stun_server(&self, server: &str) -> EngineResult<NatType> {
        self.record(EngineCall::SetStunServer(server.to_string()));
        let delay = *self.stun_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let nat = *self.nat_type.lock();
        Ok(nat)
    }

    async fn set_translation_host(&self, host: &str) -> EngineResult<bool> {
        self.record(EngineCall::SetTranslationHost(host.to_string()));
        Ok(true)
    }

    async fn add_route_entry(&self, spec: &str) -> EngineResult<bool> {
        self.record(EngineCall::AddRouteEntry(spec.to_string()));
        Ok(!spec.trim().is_empty())
    }

    fn set_product_info(&self, info: &ProductInfo) {
        self.record(EngineCall::SetProductInfo(info.clone()));
    }

    async fn shutdown_endpoints(&self) -> EngineResult<()> {
        self.record(EngineCall::ShutdownEndpoints);
        Ok(())
    }

    fn attach(&self, sink: Arc<dyn EngineEventSink>) {
        *self.sink.lock() = Some(sink);
    }

    fn detach(&self) {
        *self.sink.lock() = None;
    }
}

/// Session on a fresh mock engine, with a stream of every event
pub async fn start_session(config: SessionConfig) -> (Session, Arc<MockEngine>, EventStream) {
    let engine = MockEngine::new();
    let session = Session::start(engine.clone(), config).await.expect("session should start");
    let events = session.events().subscribe_stream(EventFilter::all());
    (session, engine, events)
}

/// Next event, failing the test after one second
pub async fn next_event(events: &mut EventStream) -> PhoneEvent {
    tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event stream closed")
}
