// ── Identifier relation store ──
//
// Bidirectional `deviceId <-> hubId` index with O(1) lookups in both
// directions and push-based change notification via a `watch` version
// counter. Each id appears in at most one relation.

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;

use crate::model::HubRecord;

/// One `hub thing <-> device` link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Relation {
    pub hub_id: String,
    pub device_id: String,
}

/// Concurrent relation index.
///
/// Individual operations are safe from any task; compound updates
/// (`set`, `sync`) are expected to come from a single writer.
pub struct RelationStore {
    hub_by_device: DashMap<String, String>,
    device_by_hub: DashMap<String, String>,
    version: watch::Sender<u64>,
}

impl Default for RelationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            hub_by_device: DashMap::new(),
            device_by_hub: DashMap::new(),
            version,
        }
    }

    /// Record a relation unless one already exists for either id.
    /// Returns `true` if it was inserted.
    pub fn ensure(&self, hub_id: &str, device_id: &str) -> bool {
        if self.device_by_hub.contains_key(hub_id) || self.hub_by_device.contains_key(device_id) {
            return false;
        }
        self.insert(hub_id, device_id);
        self.bump_version();
        true
    }

    /// Record a relation, replacing whatever either id was linked to.
    pub fn set(&self, hub_id: &str, device_id: &str) {
        self.unlink_hub(hub_id);
        self.unlink_device(device_id);
        self.insert(hub_id, device_id);
        self.bump_version();
    }

    /// Drop the relation of `device_id`. Returns the hub id it pointed at.
    pub fn delete_by_device(&self, device_id: &str) -> Option<String> {
        let removed = self.unlink_device(device_id);
        if removed.is_some() {
            self.bump_version();
        }
        removed
    }

    /// Drop the relation of `hub_id`. Returns the device id it pointed at.
    pub fn delete_by_hub(&self, hub_id: &str) -> Option<String> {
        let removed = self.unlink_hub(hub_id);
        if removed.is_some() {
            self.bump_version();
        }
        removed
    }

    pub fn device_for_hub(&self, hub_id: &str) -> Option<String> {
        self.device_by_hub.get(hub_id).map(|r| r.value().clone())
    }

    pub fn hub_for_device(&self, device_id: &str) -> Option<String> {
        self.hub_by_device.get(device_id).map(|r| r.value().clone())
    }

    /// Align the store with a hub snapshot.
    ///
    /// Relations whose hub record is gone are dropped, then every linked
    /// record in the snapshot is ensured. Records without a source link
    /// are skipped.
    pub fn sync(&self, snapshot: &[HubRecord]) {
        let stale: Vec<String> = self
            .device_by_hub
            .iter()
            .filter(|r| !snapshot.iter().any(|record| record.id == *r.key()))
            .map(|r| r.key().clone())
            .collect();

        for hub_id in &stale {
            if let Some(device_id) = self.unlink_hub(hub_id) {
                tracing::debug!(%hub_id, %device_id, "dropping relation for deleted hub thing");
            }
        }

        let mut changed = !stale.is_empty();
        for record in snapshot {
            if let Some(device_id) = record.device_id() {
                if !self.device_by_hub.contains_key(&record.id)
                    && !self.hub_by_device.contains_key(device_id)
                {
                    self.insert(&record.id, device_id);
                    changed = true;
                }
            }
        }

        if changed {
            self.bump_version();
        }
    }

    /// All relations, ordered by hub id.
    pub fn snapshot(&self) -> Vec<Relation> {
        let mut relations: Vec<Relation> = self
            .device_by_hub
            .iter()
            .map(|r| Relation {
                hub_id: r.key().clone(),
                device_id: r.value().clone(),
            })
            .collect();
        relations.sort_by(|a, b| a.hub_id.cmp(&b.hub_id));
        relations
    }

    /// Subscribe to the mutation counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn len(&self) -> usize {
        self.device_by_hub.len()
    }

    pub fn is_empty(&self) -> bool {
        self.device_by_hub.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn insert(&self, hub_id: &str, device_id: &str) {
        self.device_by_hub.insert(hub_id.to_owned(), device_id.to_owned());
        self.hub_by_device.insert(device_id.to_owned(), hub_id.to_owned());
    }

    fn unlink_hub(&self, hub_id: &str) -> Option<String> {
        let (_, device_id) = self.device_by_hub.remove(hub_id)?;
        self.hub_by_device.remove_if(&device_id, |_, linked| linked == hub_id);
        Some(device_id)
    }

    fn unlink_device(&self, device_id: &str) -> Option<String> {
        let (_, hub_id) = self.hub_by_device.remove(device_id)?;
        self.device_by_hub.remove_if(&hub_id, |_, linked| linked == device_id);
        Some(hub_id)
    }

    fn bump_version(&self) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.version.send_modify(|v| *v += 1);
    }
}
