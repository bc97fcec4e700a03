// ── Device/slot registry ──
//
// Concurrent storage for the classified devices of one session, with a
// connection-id index so pushed values resolve in O(1). Value changes are
// broadcast to subscribers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use indexmap::IndexMap;
use tokio::sync::broadcast;

use super::apply::ValueSource;
use crate::model::{Device, DeviceKind, SlotUpdate, device::display_name};

const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Binding of a connection id to one slot of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SlotRef {
    pub(crate) device_id: String,
    pub(crate) slot: String,
}

/// Thread-safe store of devices and their slot values.
///
/// Reads never block on the socket. Each device sits in its own `DashMap`
/// entry, so a reader sees either the value before or after a concurrent
/// write, never a torn slot. Lookups of unknown devices or slots return
/// `None`/`false` instead of failing.
pub struct DeviceRegistry {
    pub(crate) devices: DashMap<String, Device>,

    /// Secondary index: connection id -> slots bound to it.
    pub(crate) by_connection: DashMap<String, Vec<SlotRef>>,

    /// Values that arrived before the topology, keyed by connection id.
    pub(crate) pending: DashMap<String, String>,

    pub(crate) updates: broadcast::Sender<Arc<SlotUpdate>>,

    /// Held for writing while the topology is swapped, for reading while a
    /// value is applied. A push never sees a half-replaced index.
    pub(crate) topology: RwLock<()>,
    pub(crate) discovered: AtomicBool,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        Self {
            devices: DashMap::new(),
            by_connection: DashMap::new(),
            pending: DashMap::new(),
            updates,
            topology: RwLock::new(()),
            discovered: AtomicBool::new(false),
        }
    }

    // ── Topology ─────────────────────────────────────────────────────

    /// Replace every device with a freshly discovered set.
    ///
    /// Existing devices are discarded rather than merged. Values held back
    /// while no topology was known are applied afterwards. Returns the
    /// number of devices now registered.
    pub fn replace_all(&self, devices: IndexMap<String, Device>) -> usize {
        let _topology = self.topology.write().unwrap_or_else(PoisonError::into_inner);
        self.devices.clear();
        self.by_connection.clear();

        for (id, device) in devices {
            for (slot, binding) in &device.slots {
                self.by_connection
                    .entry(binding.connection_id.clone())
                    .or_default()
                    .push(SlotRef {
                        device_id: id.clone(),
                        slot: slot.clone(),
                    });
            }
            self.devices.insert(id, device);
        }

        self.discovered.store(true, Ordering::Release);

        let pending: Vec<(String, String)> = self
            .pending
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        self.pending.clear();
        if !pending.is_empty() {
            let applied: usize = pending
                .iter()
                .map(|(id, value)| self.apply_bound(id, value, ValueSource::Bulk))
                .sum();
            tracing::debug!(applied, "replayed values received before discovery");
        }

        self.devices.len()
    }

    /// Drop all devices and pending values.
    pub fn clear(&self) {
        let _topology = self.topology.write().unwrap_or_else(PoisonError::into_inner);
        self.devices.clear();
        self.by_connection.clear();
        self.pending.clear();
        self.discovered.store(false, Ordering::Release);
    }

    /// Whether a topology has been loaded since the last clear.
    pub fn is_discovered(&self) -> bool {
        self.discovered.load(Ordering::Acquire)
    }

    // ── Lookups ──────────────────────────────────────────────────────

    /// Devices ordered by id, optionally restricted to one kind.
    pub fn devices(&self, kind: Option<DeviceKind>) -> BTreeMap<String, Device> {
        self.devices
            .iter()
            .filter(|e| kind.is_none_or(|k| e.value().kind == k))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn device(&self, device_id: &str) -> Option<Device> {
        self.devices.get(device_id).map(|e| e.value().clone())
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    /// Connection id of a device slot.
    pub fn slot_id(&self, device_id: &str, slot: &str) -> Option<String> {
        let device = self.devices.get(device_id)?;
        device.slots.get(slot).map(|s| s.connection_id.clone())
    }

    /// Last known value of a device slot.
    pub fn slot_value(&self, device_id: &str, slot: &str) -> Option<String> {
        let device = self.devices.get(device_id)?;
        device.slots.get(slot).and_then(|s| s.value.clone())
    }

    /// Display name of a device.
    pub fn device_name(&self, device_id: &str) -> Option<String> {
        self.devices.get(device_id).map(|d| display_name(&d.name))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    // ── Local mutation ───────────────────────────────────────────────

    /// Set a slot value locally without notifying subscribers.
    ///
    /// Returns `false` if the device or slot is unknown.
    pub fn set_slot_value(&self, device_id: &str, slot: &str, value: &str) -> bool {
        let Some(mut device) = self.devices.get_mut(device_id) else {
            return false;
        };
        match device.slots.get_mut(slot) {
            Some(s) => {
                s.value = Some(value.to_owned());
                true
            }
            None => false,
        }
    }

    /// Set the first slot of `device_id` bound to `connection_id`.
    ///
    /// Used after a write to the server succeeded. Returns `false` if the
    /// device has no such binding.
    pub fn set_value_by_connection(
        &self,
        device_id: &str,
        connection_id: &str,
        value: &str,
    ) -> bool {
        let Some(mut device) = self.devices.get_mut(device_id) else {
            return false;
        };
        match device
            .slots
            .values_mut()
            .find(|s| s.connection_id == connection_id)
        {
            Some(s) => {
                s.value = Some(value.to_owned());
                true
            }
            None => false,
        }
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Receive a [`SlotUpdate`] for every pushed value and every changed
    /// bulk value.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SlotUpdate>> {
        self.updates.subscribe()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.devices.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
