//! The owning session
//!
//! A [`Session`] is the single owner of the call controller, the
//! registration controller and the event dispatcher. Both controllers hold
//! a shared handle to the signaling engine; the engine in turn holds only
//! the [`EngineEventSink`](crate::engine::EngineEventSink) installed at
//! startup, which references the controllers' tables and never the session.
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                  Session                   │
//! │  ┌────────────────┐  ┌───────────────────┐ │
//! │  │ CallController │  │ RegistrationCtrl  │ │
//! │  └───────┬────────┘  └─────────┬─────────┘ │
//! │          │   EventDispatcher   │           │
//! └──────────┼─────────────▲───────┼───────────┘
//!            ▼             │       ▼
//!    ┌───────────────────────────────────┐
//!    │   SignalingEngine ──► EngineBridge│
//!    └───────────────────────────────────┘
//! ```
//!
//! Startup and teardown are explicit: [`Session::start`] brings the engine
//! up, [`Session::shutdown`] tears everything down.

pub mod builder;
pub mod calls;
pub mod config;
pub mod pending;
pub mod registration;

mod bridge;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::end_reason::EndReason;
use crate::engine::{NatType, ProductInfo, SignalingEngine};
use crate::error::{PhoneError, PhoneResult};
use crate::events::EventDispatcher;

use self::bridge::EngineBridge;
use self::calls::{CallController, CallTable};
use self::config::SessionConfig;
use self::pending::PendingOperation;
use self::registration::{RegistrationController, RegistrationTable};

pub use self::builder::SessionBuilder;

#[derive(Debug, Default)]
struct NetworkSettings {
    stun_server: Option<String>,
    nat_type: NatType,
    translation_host: Option<String>,
    routes: Vec<String>,
}

/// Call-control session on top of one signaling engine
pub struct Session {
    config: SessionConfig,
    engine: Arc<dyn SignalingEngine>,
    dispatcher: Arc<EventDispatcher>,
    calls: CallController,
    registrations: RegistrationController,
    product: Mutex<ProductInfo>,
    network: Arc<Mutex<NetworkSettings>>,
}

impl Session {
    /// Bring up a session
    ///
    /// Validates the configuration, installs the engine bridge, pushes
    /// product info, translation host, routes and STUN server to the engine,
    /// and starts the configured listeners.
    pub async fn start(engine: Arc<dyn SignalingEngine>, config: SessionConfig) -> PhoneResult<Session> {
        config.validate()?;

        let dispatcher = Arc::new(EventDispatcher::new());
        let call_table = Arc::new(CallTable::new(dispatcher.clone(), config.local_party.clone()));
        let registration_table = Arc::new(RegistrationTable::new(dispatcher.clone()));

        let calls = CallController::new(call_table.clone(), engine.clone(), config.dtmf_duration());
        let registrations = RegistrationController::new(
            registration_table.clone(),
            engine.clone(),
            config.default_expire(),
            config.registration_timeout(),
        );

        engine.attach(Arc::new(EngineBridge::new(call_table, registration_table)));

        let session = Session {
            product: Mutex::new(config.product.clone()),
            network: Arc::new(Mutex::new(NetworkSettings::default())),
            config,
            engine,
            dispatcher,
            calls,
            registrations,
        };

        if let Err(e) = session.apply_startup_settings().await {
            tracing::error!(error = %e, "Session startup failed");
            session.engine.detach();
            return Err(e);
        }

        tracing::info!(
            product = %session.config.product.name,
            version = %session.config.product.version,
            "Session started"
        );
        Ok(session)
    }

    async fn apply_startup_settings(&self) -> PhoneResult<()> {
        self.engine.set_product_info(&self.config.product);

        if let Some(host) = &self.config.translation_host {
            self.set_translation_host(host).await?;
        }
        for route in &self.config.routes {
            self.add_route_entry(route).await?;
        }
        if let Some(server) = &self.config.stun_server {
            let nat = self.set_stun_server(server).await?;
            tracing::info!(server = %server, nat = ?nat, "STUN server configured");
        }

        self.registrations.start_listeners(self.config.listeners.clone()).await
    }

    pub fn calls(&self) -> &CallController {
        &self.calls
    }

    pub fn registrations(&self) -> &RegistrationController {
        &self.registrations
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Configure the STUN server and wait for NAT detection
    pub async fn set_stun_server(&self, server: &str) -> PhoneResult<NatType> {
        Self::apply_stun_server(self.engine.clone(), self.network.clone(), server.to_string()).await
    }

    /// Configure the STUN server on a background task
    ///
    /// Dropping or cancelling the returned handle abandons the result; the
    /// engine still completes the probe.
    pub fn set_stun_server_async(&self, server: &str) -> PhoneResult<PendingOperation<NatType>> {
        let engine = self.engine.clone();
        let network = self.network.clone();
        let server = server.to_string();
        PendingOperation::spawn("set_stun_server", Self::apply_stun_server(engine, network, server))
    }

    async fn apply_stun_server(
        engine: Arc<dyn SignalingEngine>,
        network: Arc<Mutex<NetworkSettings>>,
        server: String,
    ) -> PhoneResult<NatType> {
        if server.trim().is_empty() {
            return Err(PhoneError::invalid_configuration("stun_server", "must not be empty"));
        }
        let nat = engine.set_stun_server(&server).await?;
        let mut settings = network.lock();
        settings.stun_server = Some(server);
        settings.nat_type = nat;
        Ok(nat)
    }

    pub fn stun_server(&self) -> Option<String> {
        self.network.lock().stun_server.clone()
    }

    /// Last NAT type reported by the STUN probe
    pub fn nat_type(&self) -> NatType {
        self.network.lock().nat_type
    }

    pub async fn set_translation_host(&self, host: &str) -> PhoneResult<()> {
        if !self.engine.set_translation_host(host).await? {
            return Err(PhoneError::EngineFailure {
                detail: format!("engine rejected translation host {}", host),
                code: None,
            });
        }
        self.network.lock().translation_host = Some(host.to_string());
        Ok(())
    }

    pub fn translation_host(&self) -> Option<String> {
        self.network.lock().translation_host.clone()
    }

    pub async fn add_route_entry(&self, spec: &str) -> PhoneResult<()> {
        if !self.engine.add_route_entry(spec).await? {
            return Err(PhoneError::EngineFailure {
                detail: format!("engine rejected route entry {}", spec),
                code: None,
            });
        }
        self.network.lock().routes.push(spec.to_string());
        Ok(())
    }

    pub fn routes(&self) -> Vec<String> {
        self.network.lock().routes.clone()
    }

    pub fn product_info(&self) -> ProductInfo {
        self.product.lock().clone()
    }

    pub fn set_product_info(&self, info: ProductInfo) {
        self.engine.set_product_info(&info);
        *self.product.lock() = info;
    }

    /// Tear the session down
    ///
    /// Clears every live call, unregisters every tracked address of record,
    /// then shuts the engine's endpoints down and detaches the bridge.
    /// Failures while clearing or unregistering are logged; only the final
    /// engine shutdown is reported.
    pub async fn shutdown(self) -> PhoneResult<()> {
        for call in self.calls.active_calls() {
            if let Err(e) = self.calls.clear_call(&call.token, EndReason::LocalUser).await {
                tracing::warn!(token = %call.token, error = %e, "Could not clear call during shutdown");
            }
        }
        for aor in self.registrations.tracked() {
            if let Err(e) = self.registrations.unregister(aor.as_str()).await {
                tracing::warn!(aor = %aor, error = %e, "Could not unregister during shutdown");
            }
        }

        let result = self.engine.shutdown_endpoints().await;
        self.engine.detach();
        tracing::info!("Session shut down");
        result.map_err(PhoneError::from)
    }
}
