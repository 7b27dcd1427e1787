//! Registration operations
//!
//! [`RegistrationController`] tracks one record per address of record. The
//! engine drives each record through its lifecycle with status callbacks,
//! which the engine bridge applies; this module only creates and removes
//! records and answers queries.
//!
//! While `register` waits on the engine the attempt is also listed as in
//! flight. A status for an address nobody tracks is adopted by the single
//! in-flight attempt, which covers an engine reporting its chosen address of
//! record before `register` has returned it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::engine::{EngineRegistration, SignalingEngine};
use crate::error::{PhoneError, PhoneResult, RegError};
use crate::events::{EventDispatcher, PhoneEvent};
use crate::registration::{
    AddressOfRecord, RegistrationInfo, RegistrationMode, RegistrationParams, RegistrationState, RegistrationStats,
};
use crate::session::pending::PendingOperation;
use crate::status::StatusCode;

pub(crate) type RegistrationRecord = Arc<Mutex<RegistrationEntry>>;

pub(crate) struct RegistrationEntry {
    pub(crate) info: RegistrationInfo,
    /// Resolved by the first published status of a synchronous register
    pub(crate) waiter: Option<oneshot::Sender<StatusCode>>,
}

/// State shared between the controller and the engine bridge
pub(crate) struct RegistrationTable {
    pub(crate) registrations: DashMap<AddressOfRecord, RegistrationRecord>,
    pub(crate) dispatcher: Arc<EventDispatcher>,
    in_flight: Mutex<Vec<(AddressOfRecord, RegistrationRecord)>>,
}

/// Lists an attempt as in flight until dropped
struct InFlight {
    table: Arc<RegistrationTable>,
    record: RegistrationRecord,
}

impl InFlight {
    fn begin(table: &Arc<RegistrationTable>, requested: &AddressOfRecord, record: &RegistrationRecord) -> Self {
        table.in_flight.lock().push((requested.clone(), record.clone()));
        Self {
            table: table.clone(),
            record: record.clone(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.table
            .in_flight
            .lock()
            .retain(|(_, record)| !Arc::ptr_eq(record, &self.record));
    }
}

impl RegistrationTable {
    pub(crate) fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            registrations: DashMap::new(),
            dispatcher,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn record(&self, aor: &AddressOfRecord) -> Option<RegistrationRecord> {
        self.registrations.get(aor).map(|entry| entry.value().clone())
    }

    /// Move the only in-flight attempt under `aor`
    ///
    /// Returns `None` when no attempt, or more than one, is in flight.
    pub(crate) fn adopt_in_flight(&self, aor: &AddressOfRecord) -> Option<RegistrationRecord> {
        let in_flight = self.in_flight.lock();
        let [(requested, record)] = in_flight.as_slice() else {
            return None;
        };
        tracing::debug!(requested = %requested, registered = %aor, "Status for the address the engine chose");
        self.remove_exact(requested, record);
        record.lock().info.address_of_record = aor.clone();
        self.registrations.insert(aor.clone(), record.clone());
        Some(record.clone())
    }

    /// Drop a record only if it is still the one we hold
    fn remove_exact(&self, aor: &AddressOfRecord, record: &RegistrationRecord) {
        self.registrations.remove_if(aor, |_, current| Arc::ptr_eq(current, record));
    }
}

/// Per-address-of-record registration control on top of a [`SignalingEngine`]
#[derive(Clone)]
pub struct RegistrationController {
    table: Arc<RegistrationTable>,
    engine: Arc<dyn SignalingEngine>,
    default_expire: Duration,
    sync_timeout: Duration,
}

impl RegistrationController {
    pub(crate) fn new(
        table: Arc<RegistrationTable>,
        engine: Arc<dyn SignalingEngine>,
        default_expire: Duration,
        sync_timeout: Duration,
    ) -> Self {
        Self {
            table,
            engine,
            default_expire,
            sync_timeout,
        }
    }

    /// Register an address of record
    ///
    /// In [`RegistrationMode::Synchronous`] this waits for the first
    /// confirmation or failure and returns its status code; if none arrives
    /// within the session's registration timeout the status is
    /// [`StatusCode::LocalTimeout`] and the attempt stays in flight.
    ///
    /// In [`RegistrationMode::Asynchronous`] this returns as soon as the
    /// address of record is resolved, with [`StatusCode::Trying`]; the
    /// outcome arrives later as a `RegistrationStatus` event.
    pub async fn register(&self, params: RegistrationParams) -> Result<(AddressOfRecord, StatusCode), RegError> {
        params.validate()?;
        let aor = params.resolve_address_of_record()?;
        let request = self.engine_request(&params, aor.clone());

        match params.mode {
            RegistrationMode::Synchronous => self.register_and_wait(request).await,
            RegistrationMode::Asynchronous => self.register_in_background(request),
        }
    }

    /// Run a synchronous register on a background task
    pub fn register_async(&self, mut params: RegistrationParams) -> PhoneResult<PendingOperation<(AddressOfRecord, StatusCode)>> {
        params.mode = RegistrationMode::Synchronous;
        let controller = self.clone();
        PendingOperation::spawn("register", async move { controller.register(params).await })
    }

    fn engine_request(&self, params: &RegistrationParams, aor: AddressOfRecord) -> EngineRegistration {
        EngineRegistration {
            address_of_record: aor,
            registrar: params.registrar_domain.clone(),
            auth_identity: params.auth_identity.clone(),
            credential: params.credential.clone(),
            realm: params.realm.clone(),
            proxy: params.proxy.clone(),
            expire_interval: params.expire_interval.unwrap_or(self.default_expire),
            min_retry_interval: params.min_retry_interval,
            max_retry_interval: params.max_retry_interval,
            compatibility_mode: params.compatibility_mode,
        }
    }

    /// Insert a fresh `Registering` record, replacing any previous one
    fn track(&self, request: &EngineRegistration, waiter: Option<oneshot::Sender<StatusCode>>) -> RegistrationRecord {
        let record = Arc::new(Mutex::new(RegistrationEntry {
            info: RegistrationInfo {
                address_of_record: request.address_of_record.clone(),
                state: RegistrationState::Registering,
                last_status: None,
                expire_interval: request.expire_interval,
                created_at: Utc::now(),
                registered_at: None,
                refreshed_at: None,
            },
            waiter,
        }));
        if let Some(previous) = self
            .table
            .registrations
            .insert(request.address_of_record.clone(), record.clone())
        {
            tracing::debug!(aor = %request.address_of_record, state = %previous.lock().info.state, "Replacing registration");
        }
        record
    }

    /// Move a record to the address the engine actually registered
    fn rekey(&self, requested: &AddressOfRecord, registered: AddressOfRecord, record: &RegistrationRecord) {
        if *requested == registered {
            return;
        }
        tracing::info!(requested = %requested, registered = %registered, "Engine registered a different address of record");
        self.table.remove_exact(requested, record);
        record.lock().info.address_of_record = registered.clone();
        self.table.registrations.insert(registered, record.clone());
    }

    async fn register_and_wait(&self, request: EngineRegistration) -> PhoneResult<(AddressOfRecord, StatusCode)> {
        let (tx, rx) = oneshot::channel();
        let requested = request.address_of_record.clone();
        let record = self.track(&request, Some(tx));

        tracing::info!(aor = %requested, registrar = %request.registrar, "Registering");
        let in_flight = InFlight::begin(&self.table, &requested, &record);
        let outcome = self.engine.register(&request).await;
        drop(in_flight);
        let aor = match outcome {
            Ok(aor) => aor,
            Err(e) => {
                tracing::error!(aor = %requested, error = %e, "Registration request failed");
                let current = record.lock().info.address_of_record.clone();
                self.table.remove_exact(&current, &record);
                return Err(e.into());
            }
        };
        let current = record.lock().info.address_of_record.clone();
        self.rekey(&current, aor.clone(), &record);

        match tokio::time::timeout(self.sync_timeout, rx).await {
            Ok(Ok(status)) => Ok((aor, status)),
            Ok(Err(_)) => Err(PhoneError::cancelled(format!("registration of {}", aor))),
            Err(_) => {
                tracing::warn!(aor = %aor, timeout_ms = self.sync_timeout.as_millis() as u64, "No registration status before timeout");
                record.lock().waiter = None;
                Ok((aor, StatusCode::LocalTimeout))
            }
        }
    }

    fn register_in_background(&self, request: EngineRegistration) -> PhoneResult<(AddressOfRecord, StatusCode)> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PhoneError::internal_error(format!("asynchronous register needs a tokio runtime: {}", e)))?;

        let requested = request.address_of_record.clone();
        let record = self.track(&request, None);
        let controller = self.clone();

        tracing::info!(aor = %requested, registrar = %request.registrar, "Registering in background");
        runtime.spawn(async move {
            let in_flight = InFlight::begin(&controller.table, &request.address_of_record, &record);
            let outcome = controller.engine.register(&request).await;
            drop(in_flight);
            match outcome {
                Ok(aor) => {
                    let current = record.lock().info.address_of_record.clone();
                    controller.rekey(&current, aor, &record);
                }
                Err(e) => {
                    tracing::error!(aor = %request.address_of_record, error = %e, "Background registration failed");
                    let mut entry = record.lock();
                    entry.info.state = RegistrationState::Failed;
                    entry.info.last_status = Some(StatusCode::LocalTransportError);
                    controller.table.dispatcher.publish(PhoneEvent::RegistrationStatus {
                        address_of_record: entry.info.address_of_record.clone(),
                        was_registering: true,
                        status_code: StatusCode::LocalTransportError,
                    });
                }
            }
        });

        Ok((requested, StatusCode::Trying))
    }

    /// Ask the engine to unregister, then stop tracking
    ///
    /// A second call for the same address fails with `NotRegistered`. If the
    /// engine fails the record is kept so the caller can retry.
    pub async fn unregister(&self, address_of_record: &str) -> Result<(), RegError> {
        let aor = AddressOfRecord::from(address_of_record.trim());
        let Some(record) = self.table.record(&aor) else {
            return Err(PhoneError::not_registered(address_of_record));
        };

        match self.engine.unregister(&aor).await {
            Ok(removed) => {
                if removed {
                    tracing::info!(aor = %aor, "Unregistered");
                } else {
                    tracing::warn!(aor = %aor, "Engine had no registration to remove");
                }
                self.table.remove_exact(&aor, &record);
                let mut entry = record.lock();
                entry.info.state = RegistrationState::Unregistered;
                entry.waiter = None;
                Ok(())
            }
            Err(e) => {
                tracing::error!(aor = %aor, error = %e, "Unregister failed");
                Err(e.into())
            }
        }
    }

    /// Whether an address of record is registered
    ///
    /// With `check_offline` only a confirmed, unexpired registration counts.
    /// Without it an attempt still in flight counts too. The engine must
    /// agree in both cases.
    pub fn is_registered(&self, address_of_record: &str, check_offline: bool) -> bool {
        let aor = AddressOfRecord::from(address_of_record.trim());
        let Some(record) = self.table.record(&aor) else {
            return false;
        };
        let locally = {
            let entry = record.lock();
            if check_offline {
                matches!(
                    entry.info.state,
                    RegistrationState::Confirmed | RegistrationState::ReRegistering
                ) && !entry.info.is_stale_at(Utc::now())
            } else {
                entry.info.state.is_optimistically_registered()
            }
        };
        locally && self.engine.is_registered(&aor, check_offline)
    }

    /// Start the engine's listeners; an empty list means engine defaults
    pub async fn start_listeners(&self, interfaces: Vec<String>) -> Result<(), RegError> {
        let interfaces: Vec<String> = interfaces
            .into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect();

        match self.engine.start_listeners(&interfaces).await {
            Ok(true) => {
                if interfaces.is_empty() {
                    tracing::info!("Listeners started on engine defaults");
                } else {
                    tracing::info!(interfaces = ?interfaces, "Listeners started");
                }
                Ok(())
            }
            Ok(false) => Err(PhoneError::EngineFailure {
                detail: format!("engine could not listen on {:?}", interfaces),
                code: None,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn registration_info(&self, address_of_record: &str) -> PhoneResult<RegistrationInfo> {
        let aor = AddressOfRecord::from(address_of_record.trim());
        self.table
            .record(&aor)
            .map(|record| record.lock().info.clone())
            .ok_or_else(|| PhoneError::not_registered(address_of_record))
    }

    pub fn registrations(&self) -> Vec<RegistrationInfo> {
        let records: Vec<RegistrationRecord> = self.table.registrations.iter().map(|e| e.value().clone()).collect();
        let mut infos: Vec<RegistrationInfo> = records.iter().map(|r| r.lock().info.clone()).collect();
        infos.sort_by(|a, b| a.address_of_record.cmp(&b.address_of_record));
        infos
    }

    /// Addresses currently tracked, for teardown
    pub(crate) fn tracked(&self) -> Vec<AddressOfRecord> {
        self.table.registrations.iter().map(|e| e.key().clone()).collect()
    }

    pub fn stats(&self) -> RegistrationStats {
        let infos = self.registrations();
        RegistrationStats {
            total_registrations: infos.len(),
            confirmed_registrations: infos
                .iter()
                .filter(|i| matches!(i.state, RegistrationState::Confirmed | RegistrationState::ReRegistering))
                .count(),
            failed_registrations: infos.iter().filter(|i| i.state == RegistrationState::Failed).count(),
        }
    }
}
