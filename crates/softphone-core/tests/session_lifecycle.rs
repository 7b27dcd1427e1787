//! Session startup, network settings, event handlers and teardown

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use common::{next_event, start_session, EngineCall, MockEngine};
use softphone_core::{
    CallToken, ConnectionOptions, EndReason, EventFilter, EventKind, NatType, PhoneError, PhoneEventHandler,
    ProductInfo, RegistrationParams, Session, SessionBuilder, SessionConfig, StatusCode,
};

fn product() -> ProductInfo {
    ProductInfo {
        name: "Test Phone".to_string(),
        vendor: "Example Co".to_string(),
        version: "2.1".to_string(),
    }
}

#[tokio::test]
async fn test_startup_pushes_configuration_to_engine() {
    let config = SessionConfig::new()
        .with_product(product())
        .with_listener("udp$*:5060")
        .with_listener("tcp$*:5060")
        .with_stun_server("stun.example.com")
        .with_translation_host("203.0.113.7")
        .with_route("sip:.*=sip:<da>@gw.example.com");
    let (session, engine, _events) = start_session(config).await;

    assert_eq!(
        engine.calls(),
        vec![
            EngineCall::SetProductInfo(product()),
            EngineCall::SetTranslationHost("203.0.113.7".to_string()),
            EngineCall::AddRouteEntry("sip:.*=sip:<da>@gw.example.com".to_string()),
            EngineCall::SetStunServer("stun.example.com".to_string()),
            EngineCall::StartListeners(vec!["udp$*:5060".to_string(), "tcp$*:5060".to_string()]),
        ]
    );
    assert!(engine.is_attached());
    assert_eq!(session.stun_server().as_deref(), Some("stun.example.com"));
    assert_eq!(session.nat_type(), NatType::Cone);
    assert_eq!(session.translation_host().as_deref(), Some("203.0.113.7"));
    assert_eq!(session.routes(), vec!["sip:.*=sip:<da>@gw.example.com".to_string()]);
    assert_eq!(session.product_info(), product());
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let engine = MockEngine::new();

    let result = Session::start(engine.clone(), SessionConfig::new().with_local_party("  ")).await;

    assert!(matches!(result, Err(PhoneError::InvalidConfiguration { .. })));
    assert!(!engine.is_attached());
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_failed_startup_detaches_bridge() {
    let engine = MockEngine::new();

    let result = Session::start(engine.clone(), SessionConfig::new().with_route("")).await;

    assert!(matches!(result, Err(PhoneError::EngineFailure { .. })));
    assert!(!engine.is_attached());
    assert_eq!(engine.count(|c| matches!(c, EngineCall::StartListeners(_))), 0);
}

#[tokio::test]
async fn test_stun_server_updates_nat_type() {
    let (session, engine, _events) = start_session(SessionConfig::new()).await;
    *engine.nat_type.lock() = NatType::Symmetric;

    assert_eq!(session.set_stun_server("stun.example.org").await.unwrap(), NatType::Symmetric);
    assert_eq!(session.nat_type(), NatType::Symmetric);

    let empty = session.set_stun_server("").await;
    assert!(matches!(empty, Err(PhoneError::InvalidConfiguration { .. })));
    assert_eq!(session.stun_server().as_deref(), Some("stun.example.org"));
}

#[tokio::test]
async fn test_stun_probe_in_background() {
    let (session, engine, _events) = start_session(SessionConfig::new()).await;
    *engine.stun_delay.lock() = Some(Duration::from_millis(20));

    let pending = session.set_stun_server_async("stun.example.org").unwrap();
    assert_eq!(pending.await.unwrap(), NatType::Cone);
}

#[tokio::test]
async fn test_cancelled_stun_probe_still_completes() {
    let (session, engine, _events) = start_session(SessionConfig::new()).await;
    *engine.stun_delay.lock() = Some(Duration::from_millis(20));
    *engine.nat_type.lock() = NatType::Open;

    let pending = session.set_stun_server_async("stun.example.org").unwrap();
    pending.cancel();

    tokio::time::timeout(Duration::from_secs(1), async {
        while session.nat_type() != NatType::Open {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("probe should finish after cancellation");
    assert_eq!(session.stun_server().as_deref(), Some("stun.example.org"));
}

#[tokio::test]
async fn test_rejected_route_is_reported() {
    let (session, _engine, _events) = start_session(SessionConfig::new()).await;

    session.add_route_entry("pc:.*=sip:<da>").await.unwrap();
    assert!(matches!(
        session.add_route_entry("   ").await,
        Err(PhoneError::EngineFailure { .. })
    ));
    assert_eq!(session.routes(), vec!["pc:.*=sip:<da>".to_string()]);
}

#[tokio::test]
async fn test_product_info_update() {
    let (session, engine, _events) = start_session(SessionConfig::new()).await;

    session.set_product_info(product());

    assert_eq!(session.product_info(), product());
    assert_eq!(engine.calls().last(), Some(&EngineCall::SetProductInfo(product())));
}

#[derive(Default)]
struct Recorder {
    established: Mutex<Vec<CallToken>>,
    statuses: Mutex<Vec<StatusCode>>,
}

#[async_trait]
impl PhoneEventHandler for Recorder {
    async fn on_call_established(&self, token: CallToken) {
        self.established.lock().push(token);
    }

    async fn on_registration_status(
        &self,
        _address_of_record: softphone_core::AddressOfRecord,
        _was_registering: bool,
        status_code: StatusCode,
    ) {
        self.statuses.lock().push(status_code);
    }
}

#[tokio::test]
async fn test_filtered_handler_sees_only_its_events() {
    let (session, engine, mut events) = start_session(SessionConfig::new()).await;
    let recorder = Arc::new(Recorder::default());
    session
        .events()
        .subscribe(recorder.clone(), EventFilter::kinds([EventKind::CallEstablished]))
        .unwrap();

    *engine.register_status.lock() = Some(200);
    session
        .registrations()
        .register(RegistrationParams::new("alice", "example.com"))
        .await
        .unwrap();
    let token = session
        .calls()
        .setup_call(None, "sip:bob@example.com".to_string(), ConnectionOptions::default())
        .await
        .unwrap();
    engine.fire_established(&token);

    // the unfiltered stream sees both, in order
    next_event(&mut events).await;
    next_event(&mut events).await;

    tokio::time::timeout(Duration::from_secs(1), async {
        while recorder.established.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("handler should see the established event");
    assert_eq!(*recorder.established.lock(), vec![token]);
    assert!(recorder.statuses.lock().is_empty());
}

#[tokio::test]
async fn test_per_call_stream() {
    let (session, engine, _events) = start_session(SessionConfig::new()).await;
    let first = session
        .calls()
        .setup_call(None, "sip:bob@example.com".to_string(), ConnectionOptions::default())
        .await
        .unwrap();
    let second = session
        .calls()
        .setup_call(None, "sip:carol@example.com".to_string(), ConnectionOptions::default())
        .await
        .unwrap();
    let mut stream = session.events().subscribe_stream(EventFilter::for_call(second.clone()));

    engine.fire_established(&first);
    engine.fire_established(&second);

    assert_eq!(next_event(&mut stream).await.token(), Some(&second));
    assert!(stream.try_recv().is_none());
}

#[tokio::test]
async fn test_shutdown_clears_calls_and_registrations() {
    let (session, engine, _events) = start_session(SessionConfig::new()).await;
    *engine.register_status.lock() = Some(200);
    session
        .registrations()
        .register(RegistrationParams::new("alice", "example.com"))
        .await
        .unwrap();
    let token = session
        .calls()
        .setup_call(None, "sip:bob@example.com".to_string(), ConnectionOptions::default())
        .await
        .unwrap();

    session.shutdown().await.unwrap();

    let calls = engine.calls();
    assert!(calls.contains(&EngineCall::ClearCall {
        token,
        reason: EndReason::LocalUser,
    }));
    assert_eq!(engine.count(|c| matches!(c, EngineCall::Unregister(_))), 1);
    assert_eq!(calls.last(), Some(&EngineCall::ShutdownEndpoints));
    assert!(!engine.is_attached());
}

#[tokio::test]
async fn test_builder_starts_session() {
    let engine = MockEngine::new();

    let session = SessionBuilder::new()
        .product("Test Phone", "Example Co", "2.1")
        .local_party("sip:desk@10.0.0.9")
        .listener("udp$*:5062")
        .registration_timeout_secs(5)
        .dtmf_duration_ms(90)
        .build(engine.clone())
        .await
        .unwrap();

    assert_eq!(session.config().local_party, "sip:desk@10.0.0.9");
    assert_eq!(session.config().registration_timeout(), Duration::from_secs(5));
    assert_eq!(session.product_info(), product());
    assert!(engine
        .calls()
        .contains(&EngineCall::StartListeners(vec!["udp$*:5062".to_string()])));

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_builder_rejects_bad_debug_level() {
    let result = SessionBuilder::new().debug_level(9).build(MockEngine::new()).await;

    assert!(matches!(result, Err(PhoneError::InvalidConfiguration { .. })));
}

#[tokio::test]
async fn test_config_round_trips_through_json() {
    let json = r#"{ "local_party": "sip:me@example.com", "listeners": ["udp$*:5070"], "registration_timeout_secs": 8 }"#;
    let config = SessionConfig::from_json_str(json).unwrap();

    assert_eq!(config.local_party, "sip:me@example.com");
    assert_eq!(config.default_expire_secs, 3600);

    let (session, engine, _events) = start_session(config).await;
    assert_eq!(session.config().registration_timeout(), Duration::from_secs(8));
    assert!(engine
        .calls()
        .contains(&EngineCall::StartListeners(vec!["udp$*:5070".to_string()])));
}
