// ── Reconciliation driver ──
//
// Owns the translator's runtime: fetches hub state, reconciles device
// observations into hub commands, answers batched hub commands by
// driving the device client, and keeps the id relation store in step.
//
// Cycles for one device id are serialized on a per-entity mutex; cycles
// for different devices interleave freely.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use bulbsync_api::{
    BusMessage, BusReplier, BusReply, DeviceClient, ExecuteRequest, HubChannel, Nva, NvaResponse,
    NvaStatus,
};

use crate::config::BridgeConfig;
use crate::error::{BulbError, CoreError};
use crate::mapping::MappingTable;
use crate::model::{DeviceRecord, HubRecord};
use crate::reconcile::Reconciler;
use crate::store::RelationStore;
use crate::translate::{DeviceOperation, SystemDirective, Translation, Translator};

/// System verb suffix that re-points a hub thing at another device.
const SET_SOURCE_ID: &str = "thing/setsource_id";

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub device_id: String,
    /// Hub ids returned by `create` responses.
    pub created: Vec<String>,
    /// The update batch that was executed, if any.
    pub updates: Vec<Nva>,
}

/// The translator runtime.
///
/// Cheaply cloneable via `Arc<BridgeInner>`.
pub struct Bridge<H, D> {
    inner: Arc<BridgeInner<H, D>>,
}

impl<H, D> Clone for Bridge<H, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct BridgeInner<H, D> {
    config: BridgeConfig,
    hub: H,
    devices: D,
    reconciler: Reconciler,
    translator: Translator,
    relations: RelationStore,
    relation_writer: Mutex<()>,
    entity_locks: DashMap<String, Arc<Mutex<()>>>,
    last_sync: watch::Sender<Option<DateTime<Utc>>>,
}

impl<H: HubChannel, D: DeviceClient> Bridge<H, D> {
    pub fn new(config: BridgeConfig, hub: H, devices: D, table: Arc<MappingTable>) -> Self {
        let reconciler = Reconciler::new(config.translator_id.clone(), Arc::clone(&table));
        let translator = Translator::new(table);
        let (last_sync, _) = watch::channel(None);

        Self {
            inner: Arc::new(BridgeInner {
                config,
                hub,
                devices,
                reconciler,
                translator,
                relations: RelationStore::new(),
                relation_writer: Mutex::new(()),
                entity_locks: DashMap::new(),
                last_sync,
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn relations(&self) -> &RelationStore {
        &self.inner.relations
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.inner.reconciler
    }

    pub fn translator(&self) -> &Translator {
        &self.inner.translator
    }

    /// Time of the last completed reconciliation cycle.
    pub fn last_sync(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.inner.last_sync.subscribe()
    }

    // ── Hub access ───────────────────────────────────────────────────

    async fn execute(&self, nva: Vec<Nva>) -> Result<Vec<NvaResponse>, CoreError> {
        let config = &self.inner.config;
        let request = ExecuteRequest {
            nva,
            source_translator: config.translator_id.clone(),
            manipulator_id: config.translator_id.clone(),
            access_token: config.access_token.clone(),
        };
        Ok(self.inner.hub.execute(request).await?)
    }

    /// One attempt at fetching every hub thing this translator owns.
    pub async fn try_fetch_hub_state(&self) -> Result<Vec<HubRecord>, CoreError> {
        let mut adverb = Map::new();
        adverb.insert(
            "source.translator".into(),
            Value::String(self.inner.config.translator_id.clone()),
        );

        let mut records = Vec::new();
        for response in self.execute(vec![Nva::get(adverb)]).await? {
            records.extend(decode_things(&response)?);
        }
        Ok(records)
    }

    /// Fetch hub state, retrying forever with a fixed delay.
    ///
    /// Every failure is treated as transient.
    pub async fn fetch_hub_state(&self) -> Vec<HubRecord> {
        let delay = self.inner.config.retry_delay;
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            match self.try_fetch_hub_state().await {
                Ok(records) => {
                    debug!(count = records.len(), attempt, "fetched hub state");
                    return records;
                }
                Err(e) => {
                    error!(error = %e, attempt, "failed to fetch hub state");
                    info!(?delay, "retrying hub state fetch");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    // ── Device -> hub ────────────────────────────────────────────────

    /// Run one reconciliation cycle for an observed device.
    ///
    /// Creates go out one request each so their assigned ids can be
    /// recorded; updates go out as one batch.
    pub async fn reconcile_observation(
        &self,
        observed: DeviceRecord,
    ) -> Result<CycleReport, CoreError> {
        let device_id = observed.id().to_owned();
        let lock = self.entity_lock(&device_id);
        let result = {
            let _guard = lock.lock().await;
            self.run_cycle(observed).await
        };
        drop(lock);
        self.release_entity_lock(&device_id);
        result
    }

    async fn run_cycle(&self, observed: DeviceRecord) -> Result<CycleReport, CoreError> {
        info!(device_id = %observed.id(), "syncing device");
        let snapshot = self.fetch_hub_state().await;
        self.sync_relations(&snapshot).await;

        let patch = self
            .inner
            .reconciler
            .reconcile(std::slice::from_ref(&observed), &snapshot);
        debug!(
            device_id = %observed.id(),
            creates = patch.create.len(),
            updates = patch.update.len(),
            "computed patch"
        );

        let mut report = CycleReport {
            device_id: observed.id().to_owned(),
            ..CycleReport::default()
        };

        for create in patch.create {
            for response in self.execute(vec![create]).await? {
                for record in decode_things(&response)? {
                    let device_id = record.device_id().unwrap_or(observed.id());
                    self.record_relation(&record.id, device_id).await;
                    info!(hub_id = %record.id, %device_id, "created hub thing");
                    report.created.push(record.id);
                }
            }
        }

        if !patch.update.is_empty() {
            self.execute(patch.update.clone()).await?;
            report.updates = patch.update;
        }

        self.inner.last_sync.send_replace(Some(Utc::now()));
        Ok(report)
    }

    /// Entry point for raw observations. Failures are logged and dropped;
    /// the next observation starts over.
    pub async fn on_observation(&self, data: Value) {
        let observed = match DeviceRecord::try_from(data) {
            Ok(observed) => observed,
            Err(e) => {
                error!(error = %e, "dropping observation");
                return;
            }
        };

        match self.reconcile_observation(observed).await {
            Ok(report) => debug!(
                device_id = %report.device_id,
                created = report.created.len(),
                updates = report.updates.len(),
                "reconciliation cycle finished"
            ),
            Err(e) => {
                error!(error = %e, "reconciliation cycle failed");
                debug!(error = ?e, "reconciliation failure detail");
            }
        }
    }

    /// Patch one known hub record from a fresh device record.
    ///
    /// Returns the commands that were executed.
    pub async fn push_device_update(
        &self,
        device: &DeviceRecord,
        hub: &HubRecord,
    ) -> Result<Vec<Nva>, CoreError> {
        let commands = self.inner.reconciler.diff(device, hub);
        if commands.is_empty() {
            return Ok(commands);
        }

        info!(hub_id = %hub.id, commands = commands.len(), "updating hub thing");
        self.execute(commands.clone()).await?;
        Ok(commands)
    }

    // ── Hub -> device ────────────────────────────────────────────────

    /// Answer a batch of hub commands, one status per command.
    ///
    /// Commands are isolated: a failure yields a failed status for that
    /// command only. A payload that is not a list yields a single
    /// `WRONG_NVA_TYPE` status.
    pub async fn on_batched_nva(&self, batch: &Value) -> Vec<NvaStatus> {
        let Value::Array(commands) = batch else {
            warn!("command batch is not a list");
            return vec![
                BulbError::WrongNvaType {
                    nvas: batch.to_string(),
                }
                .to_status(),
            ];
        };

        let mut results = Vec::with_capacity(commands.len());
        for raw in commands {
            let status = match serde_json::from_value::<Nva>(raw.clone()) {
                Ok(nva) => match self.handle_command(&nva).await {
                    Ok(data) => NvaStatus::ok(data),
                    Err(e) => {
                        warn!(verb = %nva.verb, code = %e.code(), reason = %e, "command failed");
                        e.to_status()
                    }
                },
                Err(e) => {
                    warn!(error = %e, "malformed command");
                    BulbError::WrongNvaType {
                        nvas: raw.to_string(),
                    }
                    .to_status()
                }
            };
            results.push(status);
        }
        results
    }

    async fn handle_command(&self, nva: &Nva) -> Result<Option<Value>, BulbError> {
        let translator = &self.inner.translator;
        if !translator.is_supported_verb(&nva.verb) {
            return Err(BulbError::VerbNotSupported {
                verb: nva.verb.clone(),
            });
        }

        let Some(noun) = nva.noun.as_deref() else {
            return Err(BulbError::WrongNvaType {
                nvas: serde_json::to_string(nva).unwrap_or_default(),
            });
        };

        translator.validate(nva)?;

        // projections such as toggle depend on the state, so it is read
        // rather than guessed; system verbs need neither device nor state
        let device = if translator.is_system_verb(&nva.verb) {
            None
        } else {
            let device_id = self.inner.relations.device_for_hub(noun).ok_or_else(|| {
                BulbError::NoDeviceResponse {
                    device_id: noun.to_owned(),
                }
            })?;
            let current = self.read_device_state(&device_id).await?;
            Some((device_id, current))
        };

        match translator.translate(nva, device.as_ref().map(|(_, current)| current))? {
            Translation::System(directive) => self.apply_system_directive(noun, nva, &directive).await,
            Translation::Device(operation) => {
                let Some((device_id, _)) = &device else {
                    return Err(BulbError::NoDeviceResponse {
                        device_id: noun.to_owned(),
                    });
                };
                self.invoke_device(device_id, &operation).await
            }
        }
    }

    async fn read_device_state(&self, device_id: &str) -> Result<DeviceRecord, BulbError> {
        let timeout = self.inner.config.device_timeout;
        let no_response = || BulbError::NoDeviceResponse {
            device_id: device_id.to_owned(),
        };

        match tokio::time::timeout(timeout, self.inner.devices.current_state(device_id)).await {
            Ok(Ok(Some(raw))) => DeviceRecord::try_from(raw).map_err(|e| {
                warn!(%device_id, error = %e, "device reported an unusable state");
                no_response()
            }),
            Ok(Ok(None)) => {
                warn!(%device_id, "device reported no state");
                Err(no_response())
            }
            Ok(Err(e)) => {
                warn!(%device_id, error = %e, "cannot read device state");
                Err(no_response())
            }
            Err(_) => {
                warn!(%device_id, ?timeout, "device state read timed out");
                Err(no_response())
            }
        }
    }

    async fn invoke_device(
        &self,
        device_id: &str,
        operation: &DeviceOperation,
    ) -> Result<Option<Value>, BulbError> {
        let timeout = self.inner.config.device_timeout;
        let no_response = || BulbError::NoDeviceResponse {
            device_id: device_id.to_owned(),
        };

        let call = self
            .inner
            .devices
            .invoke(device_id, &operation.method, &operation.args);
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(Some(answer))) => {
                debug!(%device_id, method = %operation.method, "device answered");
                Ok((!answer.is_null()).then_some(answer))
            }
            Ok(Ok(None)) => Err(no_response()),
            Ok(Err(e)) => {
                warn!(%device_id, method = %operation.method, error = %e, "device invocation failed");
                Err(no_response())
            }
            Err(_) => {
                warn!(%device_id, method = %operation.method, "device invocation timed out");
                Err(no_response())
            }
        }
    }

    async fn apply_system_directive(
        &self,
        noun: &str,
        nva: &Nva,
        directive: &SystemDirective,
    ) -> Result<Option<Value>, BulbError> {
        let suffix = directive.verb.split_once('/').map(|(_, rest)| rest);
        if !directive.is_system_configurable || suffix != Some(SET_SOURCE_ID) {
            debug!(verb = %directive.verb, "system directive has no local effect");
            return Ok(None);
        }

        let Some(device_id) = nva.adverb.get("value").and_then(Value::as_str) else {
            return Err(BulbError::AdverbFieldRequired {
                field: "value".into(),
                verb: nva.verb.clone(),
            });
        };

        let _writer = self.inner.relation_writer.lock().await;
        let previous = self.inner.relations.device_for_hub(noun);
        self.inner.relations.set(noun, device_id);
        info!(hub_id = %noun, %device_id, ?previous, "re-pointed source relation");
        Ok(None)
    }

    // ── Relations ────────────────────────────────────────────────────

    async fn sync_relations(&self, snapshot: &[HubRecord]) {
        let _writer = self.inner.relation_writer.lock().await;
        self.inner.relations.sync(snapshot);
    }

    async fn record_relation(&self, hub_id: &str, device_id: &str) {
        let _writer = self.inner.relation_writer.lock().await;
        self.inner.relations.set(hub_id, device_id);
    }

    fn entity_lock(&self, device_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(&self.inner.entity_locks.entry(device_id.to_owned()).or_default())
    }

    /// Drop the device's lock entry unless another cycle holds or awaits it.
    fn release_entity_lock(&self, device_id: &str) {
        self.inner
            .entity_locks
            .remove_if(device_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Devices with a reconciliation cycle running or queued.
    pub fn active_entities(&self) -> usize {
        self.inner.entity_locks.len()
    }

    // ── Message pump ─────────────────────────────────────────────────

    /// Consume bus messages until cancelled or the bus closes.
    ///
    /// Each message is handled on its own task; command batches are
    /// answered through `replier`.
    pub async fn serve(
        &self,
        mut messages: broadcast::Receiver<Arc<BusMessage>>,
        replier: BusReplier,
        cancel: CancellationToken,
    ) {
        info!(translator_id = %self.inner.config.translator_id, "serving bus messages");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                message = messages.recv() => match message {
                    Ok(message) => self.dispatch(message, replier.clone()),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "bus consumer lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("bus message pump stopped");
    }

    fn dispatch(&self, message: Arc<BusMessage>, replier: BusReplier) {
        let bridge = self.clone();
        tokio::spawn(async move {
            match &*message {
                BusMessage::Observation { request } => {
                    bridge.on_observation(request.data.clone()).await;
                }
                BusMessage::Nva(batch) => {
                    let results = bridge.on_batched_nva(&batch.nva).await;
                    let reply = BusReply::NvaResponse {
                        id: batch.id.clone(),
                        results,
                    };
                    if let Err(e) = replier.send(reply).await {
                        warn!(error = %e, "cannot send command results");
                    }
                }
            }
        });
    }
}

fn decode_things(response: &NvaResponse) -> Result<Vec<HubRecord>, CoreError> {
    let things = response
        .things()
        .map_err(|e| CoreError::InvalidHubRecord {
            message: e.to_string(),
        })?;
    Ok(things.into_iter().map(HubRecord::from).collect())
}
