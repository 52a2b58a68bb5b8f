#![allow(clippy::unwrap_used)]
// End-to-end tests for `Bridge` against in-memory hub and device fakes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Map, Value, json};

use bulbsync_api::{
    DeviceClient, Error, ExecuteRequest, HubChannel, Nva, NvaResponse, NvaStatus,
};
use bulbsync_core::{Bridge, BridgeConfig, DeviceRecord, HubRecord, MappingTable};

// ── Fakes ───────────────────────────────────────────────────────────

#[derive(Default)]
struct HubState {
    things: Mutex<Vec<Value>>,
    batches: Mutex<Vec<Vec<Nva>>>,
    failing_fetches: AtomicUsize,
    failing_writes: AtomicUsize,
    fetches: AtomicUsize,
}

#[derive(Clone, Default)]
struct FakeHub(Arc<HubState>);

impl FakeHub {
    fn batches(&self) -> Vec<Vec<Nva>> {
        self.0.batches.lock().unwrap().clone()
    }

    /// Batches other than state fetches.
    fn writes(&self) -> Vec<Vec<Nva>> {
        self.batches()
            .into_iter()
            .filter(|batch| batch.iter().all(|nva| nva.verb != "get"))
            .collect()
    }

    fn thing(&self, id: &str) -> Value {
        self.0
            .things
            .lock()
            .unwrap()
            .iter()
            .find(|thing| thing["id"] == id)
            .cloned()
            .unwrap()
    }

    fn apply(&self, nva: &Nva) -> Value {
        let mut things = self.0.things.lock().unwrap();
        match nva.verb.as_str() {
            "get" => Value::Array(things.clone()),
            "create" => {
                let mut thing = nva.adverb.clone();
                let n = things.len() + 1;
                thing.insert("id".into(), json!(format!("thing-{n}")));
                thing.insert("reachable".into(), json!(true));
                let thing = Value::Object(thing);
                things.push(thing.clone());
                thing
            }
            verb => {
                let noun = nva.noun.as_deref().unwrap();
                let thing = things.iter_mut().find(|thing| thing["id"] == noun).unwrap();
                let target = if verb == "tag" {
                    thing["tags"].as_object_mut().unwrap()
                } else {
                    thing.as_object_mut().unwrap()
                };
                merge(target, &nva.adverb);
                Value::Null
            }
        }
    }
}

fn merge(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        if let (Some(Value::Object(current)), Value::Object(inner)) = (target.get_mut(key), value) {
            merge(current, inner);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

impl HubChannel for FakeHub {
    async fn execute(&self, request: ExecuteRequest) -> Result<Vec<NvaResponse>, Error> {
        assert_eq!(request.source_translator, "tr-1");
        self.0.batches.lock().unwrap().push(request.nva.clone());

        if request.nva.iter().any(|nva| nva.verb == "get") {
            self.0.fetches.fetch_add(1, Ordering::SeqCst);
            let failing = self.0.failing_fetches.load(Ordering::SeqCst);
            if failing > 0 {
                self.0.failing_fetches.store(failing - 1, Ordering::SeqCst);
                return Err(Error::Hub {
                    status: 503,
                    message: "hub restarting".into(),
                });
            }
        } else {
            let failing = self.0.failing_writes.load(Ordering::SeqCst);
            if failing > 0 {
                self.0.failing_writes.store(failing - 1, Ordering::SeqCst);
                return Err(Error::Hub {
                    status: 500,
                    message: "write rejected".into(),
                });
            }
        }

        Ok(request
            .nva
            .iter()
            .map(|nva| NvaResponse {
                data: self.apply(nva),
            })
            .collect())
    }
}

#[derive(Default)]
struct DeviceState {
    states: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<(String, String, Value)>>,
    hang: AtomicBool,
    unreadable: AtomicBool,
}

#[derive(Clone, Default)]
struct FakeDevices(Arc<DeviceState>);

impl FakeDevices {
    fn with_device(self, id: &str, state: Value) -> Self {
        self.0.states.lock().unwrap().insert(id.into(), state);
        self
    }

    fn calls(&self) -> Vec<(String, String, Value)> {
        self.0.calls.lock().unwrap().clone()
    }
}

impl DeviceClient for FakeDevices {
    async fn current_state(&self, device_id: &str) -> Result<Option<Value>, Error> {
        if self.0.unreadable.load(Ordering::SeqCst) {
            return Err(Error::Device {
                device_id: device_id.into(),
                status: 502,
                message: "state unavailable".into(),
            });
        }
        Ok(self.0.states.lock().unwrap().get(device_id).cloned())
    }

    async fn invoke(
        &self,
        device_id: &str,
        method: &str,
        args: &Value,
    ) -> Result<Option<Value>, Error> {
        if self.0.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        let known = self.0.states.lock().unwrap().contains_key(device_id);
        if !known {
            return Ok(None);
        }
        self.0
            .calls
            .lock()
            .unwrap()
            .push((device_id.into(), method.into(), args.clone()));
        Ok(Some(Value::Null))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn bridge(hub: &FakeHub, devices: &FakeDevices) -> Bridge<FakeHub, FakeDevices> {
    let config = BridgeConfig::new("tr-1", SecretString::from("token".to_string()))
        .with_retry_delay(Duration::from_millis(1))
        .with_device_timeout(Duration::from_millis(20));
    Bridge::new(
        config,
        hub.clone(),
        devices.clone(),
        Arc::new(MappingTable::builtin()),
    )
}

fn observed(value: Value) -> DeviceRecord {
    DeviceRecord::try_from(value).unwrap()
}

fn adverb(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

/// A bridge with `Bulb-1` already mirrored as `thing-1`.
async fn linked() -> (FakeHub, FakeDevices, Bridge<FakeHub, FakeDevices>) {
    let hub = FakeHub::default();
    let devices =
        FakeDevices::default().with_device("Bulb-1", json!({ "id": "Bulb-1", "on": true }));
    let bridge = bridge(&hub, &devices);
    bridge
        .reconcile_observation(observed(json!({ "id": "Bulb-1", "on": true })))
        .await
        .unwrap();
    (hub, devices, bridge)
}

// ── Device -> hub ───────────────────────────────────────────────────

#[tokio::test]
async fn new_device_is_created_and_linked() {
    let hub = FakeHub::default();
    let devices = FakeDevices::default();
    let bridge = bridge(&hub, &devices);
    let last_sync = bridge.last_sync();
    assert!(last_sync.borrow().is_none());

    let report = bridge
        .reconcile_observation(observed(json!({ "id": "Bulb-1", "on": true })))
        .await
        .unwrap();

    assert_eq!(report.created, vec!["thing-1".to_string()]);
    assert!(report.updates.is_empty());

    let writes = hub.writes();
    assert_eq!(writes.len(), 1);
    let create = &writes[0][0];
    assert_eq!(create.verb, "create");
    assert_eq!(create.adverb["name"], json!("bulb-1"));
    assert_eq!(create.adverb["state"], json!("on"));
    assert_eq!(
        create.adverb["source"],
        json!({ "translator": "tr-1", "id": "Bulb-1" })
    );
    assert!(!create.adverb.contains_key("reachable"));

    assert_eq!(bridge.relations().device_for_hub("thing-1").as_deref(), Some("Bulb-1"));
    assert!(last_sync.borrow().is_some());
}

#[tokio::test]
async fn known_device_gets_one_update_batch() {
    let (hub, _devices, bridge) = linked().await;

    let report = bridge
        .reconcile_observation(observed(json!({ "id": "Bulb-1", "on": false, "label": "Desk" })))
        .await
        .unwrap();

    assert!(report.created.is_empty());
    assert_eq!(
        report.updates,
        vec![Nva::set(
            "thing-1",
            adverb(json!({ "state": "off", "label": "Desk" }))
        )]
    );
    assert_eq!(hub.writes().last().unwrap(), &report.updates);
    assert_eq!(hub.thing("thing-1")["state"], json!("off"));
}

#[tokio::test]
async fn unchanged_observation_writes_nothing() {
    let (hub, _devices, bridge) = linked().await;
    let writes_before = hub.writes().len();

    let report = bridge
        .reconcile_observation(observed(json!({ "id": "Bulb-1", "on": true })))
        .await
        .unwrap();

    assert!(report.created.is_empty());
    assert!(report.updates.is_empty());
    assert_eq!(hub.writes().len(), writes_before);
}

#[tokio::test]
async fn hub_fetch_retries_until_success() {
    let hub = FakeHub::default();
    hub.0.failing_fetches.store(3, Ordering::SeqCst);
    let bridge = bridge(&hub, &FakeDevices::default());

    let records = bridge.fetch_hub_state().await;

    assert!(records.is_empty());
    assert_eq!(hub.0.fetches.load(Ordering::SeqCst), 4);
    let fetch = &hub.batches()[0][0];
    assert_eq!(fetch.adverb, adverb(json!({ "source.translator": "tr-1" })));
}

#[tokio::test]
async fn invalid_observation_is_dropped() {
    let hub = FakeHub::default();
    let bridge = bridge(&hub, &FakeDevices::default());

    bridge.on_observation(json!({ "on": true })).await;
    bridge.on_observation(json!([1, 2])).await;

    assert!(hub.batches().is_empty());
    assert!(bridge.last_sync().borrow().is_none());
}

#[tokio::test]
async fn push_device_update_patches_known_record() {
    let hub = FakeHub::default();
    let bridge = bridge(&hub, &FakeDevices::default());
    bridge
        .reconcile_observation(observed(json!({ "id": "Bulb-1", "on": true })))
        .await
        .unwrap();
    let record = HubRecord::try_from(hub.thing("thing-1")).unwrap();

    let sent = bridge
        .push_device_update(&observed(json!({ "id": "Bulb-1", "on": false })), &record)
        .await
        .unwrap();
    assert_eq!(sent, vec![Nva::set("thing-1", adverb(json!({ "state": "off" })))]);

    let record = HubRecord::try_from(hub.thing("thing-1")).unwrap();
    let sent = bridge
        .push_device_update(&observed(json!({ "id": "Bulb-1", "on": false })), &record)
        .await
        .unwrap();
    assert!(sent.is_empty());
}

#[tokio::test]
async fn concurrent_observations_of_one_device_create_once() {
    let hub = FakeHub::default();
    let bridge = bridge(&hub, &FakeDevices::default());

    let (a, b) = tokio::join!(
        bridge.reconcile_observation(observed(json!({ "id": "Bulb-1", "on": true }))),
        bridge.reconcile_observation(observed(json!({ "id": "Bulb-1", "on": true }))),
    );
    let created = a.unwrap().created.len() + b.unwrap().created.len();

    assert_eq!(created, 1);
    assert_eq!(hub.0.things.lock().unwrap().len(), 1);
    assert_eq!(bridge.active_entities(), 0);
}

#[tokio::test]
async fn entity_locks_are_released_after_each_cycle() {
    let hub = FakeHub::default();
    let bridge = bridge(&hub, &FakeDevices::default());

    for n in 0..5 {
        bridge
            .reconcile_observation(observed(json!({ "id": format!("Bulb-{n}"), "on": true })))
            .await
            .unwrap();
    }
    hub.0.failing_writes.store(1, Ordering::SeqCst);
    bridge.on_observation(json!({ "id": "Bulb-9", "on": true })).await;

    assert_eq!(bridge.active_entities(), 0);
}

#[tokio::test]
async fn failed_create_drops_the_cycle() {
    let hub = FakeHub::default();
    hub.0.failing_writes.store(2, Ordering::SeqCst);
    let bridge = bridge(&hub, &FakeDevices::default());
    let bulb = json!({ "id": "Bulb-1", "on": true });

    assert!(bridge.reconcile_observation(observed(bulb.clone())).await.is_err());
    bridge.on_observation(bulb.clone()).await;

    assert!(hub.0.things.lock().unwrap().is_empty());
    assert!(bridge.relations().hub_for_device("Bulb-1").is_none());
    assert!(bridge.last_sync().borrow().is_none());

    // the next observation starts over from a fresh fetch
    let report = bridge.reconcile_observation(observed(bulb)).await.unwrap();
    assert_eq!(report.created, vec!["thing-1".to_string()]);
    assert_eq!(hub.0.fetches.load(Ordering::SeqCst), 3);
    assert_eq!(hub.writes().len(), 3);
    assert!(bridge.last_sync().borrow().is_some());
}

#[tokio::test]
async fn failed_update_is_resent_next_cycle() {
    let (hub, _devices, bridge) = linked().await;
    hub.0.failing_writes.store(1, Ordering::SeqCst);
    let off = json!({ "id": "Bulb-1", "on": false });

    bridge.on_observation(off.clone()).await;
    assert_eq!(hub.thing("thing-1")["state"], json!("on"));

    let report = bridge.reconcile_observation(observed(off)).await.unwrap();
    assert_eq!(
        report.updates,
        vec![Nva::set("thing-1", adverb(json!({ "state": "off" })))]
    );
    assert_eq!(hub.thing("thing-1")["state"], json!("off"));
}

// ── Hub -> device ───────────────────────────────────────────────────

#[tokio::test]
async fn batch_yields_one_status_per_command() {
    let (_hub, devices, bridge) = linked().await;

    let results = bridge
        .on_batched_nva(&json!([
            { "noun": "thing-1", "verb": "base/power/toggle", "adverb": { "duration": 300 } },
            { "noun": "thing-1", "verb": "base/power/dim", "adverb": {} },
            { "noun": "thing-1", "verb": "base/color/set", "adverb": { "brightness": 0.5 } },
            { "noun": "thing-9", "verb": "base/power/on", "adverb": {} },
            "not a command",
        ]))
        .await;

    assert_eq!(
        results,
        vec![
            NvaStatus::ok(None),
            NvaStatus::failed("VERB_IS_NOT_SUPPORTED", "Verb: base/power/dim"),
            NvaStatus::failed(
                "ADVERB_FIELD_REQUIRED",
                "Field hue is required in adverb for verb base/color/set"
            ),
            NvaStatus::failed("NO_DEVICE_RESPONSE", "No response from device thing-9"),
            NvaStatus::failed("WRONG_NVA_TYPE", "NVAs: \"not a command\""),
        ]
    );

    // toggle reads the current state (on) before translating
    assert_eq!(
        devices.calls(),
        vec![(
            "Bulb-1".to_string(),
            "setPower".to_string(),
            json!({ "on": false, "duration": 300 })
        )]
    );
}

#[tokio::test]
async fn unreadable_device_state_fails_the_command() {
    let (_hub, devices, bridge) = linked().await;
    devices.0.unreadable.store(true, Ordering::SeqCst);

    let results = bridge
        .on_batched_nva(&json!([
            { "noun": "thing-1", "verb": "base/power/toggle", "adverb": {} },
            { "noun": "thing-1", "verb": "base/color/set", "adverb": {} },
        ]))
        .await;

    assert_eq!(
        results,
        vec![
            NvaStatus::failed("NO_DEVICE_RESPONSE", "No response from device Bulb-1"),
            NvaStatus::failed(
                "ADVERB_FIELD_REQUIRED",
                "Field hue is required in adverb for verb base/color/set"
            ),
        ]
    );
    assert!(devices.calls().is_empty());
}

#[tokio::test]
async fn non_list_batch_is_wrong_type() {
    let bridge = bridge(&FakeHub::default(), &FakeDevices::default());

    let results = bridge.on_batched_nva(&json!({ "verb": "base/power/on" })).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].error.as_ref().unwrap().code, "WRONG_NVA_TYPE");
}

#[tokio::test]
async fn hanging_device_times_out() {
    let (_hub, devices, bridge) = linked().await;
    devices.0.hang.store(true, Ordering::SeqCst);

    let results = bridge
        .on_batched_nva(&json!([{ "noun": "thing-1", "verb": "base/power/on", "adverb": {} }]))
        .await;

    assert_eq!(
        results,
        vec![NvaStatus::failed("NO_DEVICE_RESPONSE", "No response from device Bulb-1")]
    );
}

#[tokio::test]
async fn setsource_id_repoints_relation() {
    let (_hub, devices, bridge) = linked().await;
    let devices = devices.with_device("Bulb-2", json!({ "id": "Bulb-2", "on": false }));

    let results = bridge
        .on_batched_nva(&json!([
            { "noun": "thing-1", "verb": "darwin/thing/setsource_id", "adverb": {} },
            { "noun": "thing-1", "verb": "darwin/thing/setsource_id", "adverb": { "value": "Bulb-2" } },
            { "noun": "thing-1", "verb": "base/power/on", "adverb": {} },
        ]))
        .await;

    assert_eq!(
        results,
        vec![
            NvaStatus::failed(
                "ADVERB_FIELD_REQUIRED",
                "Field value is required in adverb for verb darwin/thing/setsource_id"
            ),
            NvaStatus::ok(None),
            NvaStatus::ok(None),
        ]
    );
    assert_eq!(bridge.relations().device_for_hub("thing-1").as_deref(), Some("Bulb-2"));
    assert!(bridge.relations().hub_for_device("Bulb-1").is_none());
    assert_eq!(devices.calls()[0].0, "Bulb-2");
}
