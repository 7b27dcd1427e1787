//! Fluent construction of a [`Session`]
//!
//! ```rust,no_run
//! use softphone_core::{SessionBuilder, SignalingEngine};
//! use std::sync::Arc;
//!
//! # async fn example(engine: Arc<dyn SignalingEngine>) -> softphone_core::PhoneResult<()> {
//! let session = SessionBuilder::new()
//!     .product("Softphone", "Example Co", "1.0")
//!     .listener("udp$*:5060")
//!     .stun_server("stun.example.com")
//!     .registration_timeout_secs(10)
//!     .build(engine)
//!     .await?;
//!
//! session.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::engine::{ProductInfo, SignalingEngine};
use crate::error::PhoneResult;
use crate::logging;
use crate::session::config::SessionConfig;
use crate::session::Session;

/// Chainable wrapper around [`SessionConfig`]
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn product(mut self, name: impl Into<String>, vendor: impl Into<String>, version: impl Into<String>) -> Self {
        self.config.product = ProductInfo {
            name: name.into(),
            vendor: vendor.into(),
            version: version.into(),
        };
        self
    }

    pub fn local_party(mut self, local_party: impl Into<String>) -> Self {
        self.config.local_party = local_party.into();
        self
    }

    pub fn listener(mut self, interface: impl Into<String>) -> Self {
        self.config.listeners.push(interface.into());
        self
    }

    pub fn stun_server(mut self, server: impl Into<String>) -> Self {
        self.config.stun_server = Some(server.into());
        self
    }

    pub fn translation_host(mut self, host: impl Into<String>) -> Self {
        self.config.translation_host = Some(host.into());
        self
    }

    pub fn route(mut self, spec: impl Into<String>) -> Self {
        self.config.routes.push(spec.into());
        self
    }

    pub fn registration_timeout_secs(mut self, secs: u64) -> Self {
        self.config.registration_timeout_secs = secs;
        self
    }

    pub fn default_expire_secs(mut self, secs: u64) -> Self {
        self.config.default_expire_secs = secs;
        self
    }

    pub fn dtmf_duration_ms(mut self, ms: u64) -> Self {
        self.config.dtmf_duration_ms = Some(ms);
        self
    }

    pub fn debug_level(mut self, level: u8) -> Self {
        self.config.debug_level = Some(level);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start the session on `engine`
    ///
    /// When a debug level is configured, a global tracing subscriber is
    /// installed first unless one already exists.
    pub async fn build(self, engine: Arc<dyn SignalingEngine>) -> PhoneResult<Session> {
        self.config.validate()?;
        if let Some(level) = self.config.debug_level {
            if let Err(e) = logging::init(level) {
                tracing::debug!(error = %e, "Keeping existing tracing subscriber");
            }
        }
        Session::start(engine, self.config).await
    }
}
