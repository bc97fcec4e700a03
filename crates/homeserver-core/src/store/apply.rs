// ── Value application ──
//
// Applies values received from the server (pushes and bulk listings) to
// every slot bound to the reported connection id.

use std::sync::{Arc, PoisonError};

use tracing::trace;

use super::DeviceRegistry;
use crate::model::SlotUpdate;

/// How a value reached the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Unsolicited push (action 1). Every matched slot is notified, even if
    /// the value equals the cached one, so echoes of local writes are seen.
    Push,
    /// Bulk listing (action 2) or values replayed after discovery. Only
    /// slots whose value actually changes are notified.
    Bulk,
}

impl DeviceRegistry {
    /// Apply one `(connection id, value)` pair.
    ///
    /// Before any topology is loaded the value is held back and replayed by
    /// [`replace_all`](Self::replace_all). Returns the number of slots
    /// broadcast as a [`SlotUpdate`].
    pub fn apply_value(&self, connection_id: &str, value: &str, source: ValueSource) -> usize {
        let _topology = self.topology.read().unwrap_or_else(PoisonError::into_inner);
        if !self.is_discovered() {
            self.pending
                .insert(connection_id.to_owned(), value.to_owned());
            return 0;
        }
        self.apply_bound(connection_id, value, source)
    }

    /// Apply a batch of `(connection id, value)` pairs in order.
    pub fn apply_values<I, K, V>(&self, values: I, source: ValueSource) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        values
            .into_iter()
            .map(|(id, value)| self.apply_value(id.as_ref(), value.as_ref(), source))
            .sum()
    }

    /// Caller holds the topology lock.
    pub(super) fn apply_bound(&self, connection_id: &str, value: &str, source: ValueSource) -> usize {
        let Some(targets) = self
            .by_connection
            .get(connection_id)
            .map(|r| r.value().clone())
        else {
            trace!(connection_id, "value for unbound connection");
            return 0;
        };

        let mut notified = 0;
        for target in targets {
            let Some(mut device) = self.devices.get_mut(&target.device_id) else {
                continue;
            };
            let Some(slot) = device.slots.get_mut(&target.slot) else {
                continue;
            };
            if source == ValueSource::Bulk && slot.value.as_deref() == Some(value) {
                continue;
            }
            slot.value = Some(value.to_owned());
            drop(device);

            trace!(device_id = %target.device_id, slot = %target.slot, value, "slot updated");
            notified += 1;
            // No receivers is fine.
            let _ = self.updates.send(Arc::new(SlotUpdate {
                device_id: target.device_id,
                slot: target.slot,
                connection_id: connection_id.to_owned(),
                value: value.to_owned(),
            }));
        }
        notified
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Device, DeviceKind, Slot};

    fn device(id: &str, name: &str, kind: DeviceKind, slots: &[(&str, &str)]) -> Device {
        Device {
            id: id.into(),
            name: name.into(),
            kind,
            slots: slots
                .iter()
                .map(|(slot, conn)| ((*slot).to_owned(), Slot::new(*conn)))
                .collect(),
        }
    }

    fn registry() -> DeviceRegistry {
        let registry = DeviceRegistry::new();
        let devices: IndexMap<_, _> = [
            device("1", r"EG\Kitchen\Ceiling", DeviceKind::Light, &[("switch", "C1")]),
            device(
                "2",
                r"EG\Hall\Spots",
                DeviceKind::Dimmer,
                &[("switch", "C2"), ("brightness", "C3")],
            ),
            device("3", "Mirror", DeviceKind::Light, &[("switch", "C1")]),
        ]
        .into_iter()
        .map(|d| (d.id.clone(), d))
        .collect();
        registry.replace_all(devices);
        registry
    }

    #[test]
    fn set_then_get_slot_value() {
        let reg = registry();
        assert!(reg.set_slot_value("2", "brightness", "42"));
        assert_eq!(reg.slot_value("2", "brightness").as_deref(), Some("42"));
        assert_eq!(reg.slot_id("2", "brightness").as_deref(), Some("C3"));
    }

    #[test]
    fn absent_lookups_are_none() {
        let reg = registry();
        assert_eq!(reg.slot_value("99", "switch"), None);
        assert_eq!(reg.slot_id("1", "brightness"), None);
        assert_eq!(reg.device_name("99"), None);
        assert!(!reg.set_slot_value("99", "switch", "1"));
        assert!(!reg.set_slot_value("1", "nope", "1"));
        assert_eq!(reg.slot_value("1", "switch"), None);
    }

    #[test]
    fn device_name_strips_prefix() {
        let reg = registry();
        assert_eq!(reg.device_name("1").as_deref(), Some("Kitchen Ceiling"));
        assert_eq!(reg.device_name("3").as_deref(), Some("Mirror"));
    }

    #[test]
    fn devices_filter_by_kind() {
        let reg = registry();
        let lights = reg.devices(Some(DeviceKind::Light));
        assert_eq!(lights.keys().collect::<Vec<_>>(), vec!["1", "3"]);
        assert_eq!(reg.devices(None).len(), 3);
        assert!(reg.devices(Some(DeviceKind::Climate)).is_empty());
    }

    #[test]
    fn push_updates_every_bound_slot_and_notifies() {
        let reg = registry();
        let mut rx = reg.subscribe();

        assert_eq!(reg.apply_value("C1", "1", ValueSource::Push), 2);
        assert_eq!(reg.slot_value("1", "switch").as_deref(), Some("1"));
        assert_eq!(reg.slot_value("3", "switch").as_deref(), Some("1"));

        let mut seen = vec![rx.try_recv().unwrap().device_id.clone()];
        seen.push(rx.try_recv().unwrap().device_id.clone());
        seen.sort();
        assert_eq!(seen, vec!["1", "3"]);
    }

    #[test]
    fn unchanged_bulk_value_is_not_rebroadcast() {
        let reg = registry();
        let mut rx = reg.subscribe();
        assert_eq!(reg.apply_value("C3", "10", ValueSource::Bulk), 1);
        assert_eq!(reg.apply_value("C3", "10", ValueSource::Bulk), 0);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn repeated_push_is_rebroadcast() {
        let reg = registry();
        let mut rx = reg.subscribe();
        assert_eq!(reg.apply_value("C3", "10", ValueSource::Push), 1);
        assert_eq!(reg.apply_value("C3", "10", ValueSource::Push), 1);
        assert_eq!(rx.try_recv().unwrap().value, "10");
        assert_eq!(rx.try_recv().unwrap().value, "10");
    }

    #[test]
    fn push_after_local_write_notifies() {
        let reg = registry();
        let mut rx = reg.subscribe();
        assert!(reg.set_value_by_connection("2", "C3", "42"));
        assert!(rx.try_recv().is_err());

        assert_eq!(reg.apply_value("C3", "42", ValueSource::Push), 1);
        let update = rx.try_recv().unwrap();
        assert_eq!((update.device_id.as_str(), update.slot.as_str()), ("2", "brightness"));
    }

    #[test]
    fn push_waits_for_topology_swap() {
        let reg = Arc::new(registry());
        let swap = reg.topology.write().unwrap();

        let pusher = {
            let reg = Arc::clone(&reg);
            std::thread::spawn(move || reg.apply_value("C3", "5", ValueSource::Push))
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!pusher.is_finished());

        drop(swap);
        assert_eq!(pusher.join().unwrap(), 1);
        assert_eq!(reg.slot_value("2", "brightness").as_deref(), Some("5"));
    }

    #[test]
    fn unknown_connection_is_ignored() {
        let reg = registry();
        assert_eq!(reg.apply_value("C404", "1", ValueSource::Push), 0);
        assert!(reg.pending.is_empty());
    }

    #[test]
    fn values_before_discovery_are_replayed() {
        let reg = DeviceRegistry::new();
        assert_eq!(reg.apply_values([("C1", "1"), ("C9", "x")], ValueSource::Bulk), 0);

        let devices: IndexMap<_, _> = [(
            "1".to_owned(),
            device("1", "Lamp", DeviceKind::Light, &[("switch", "C1")]),
        )]
        .into_iter()
        .collect();
        assert_eq!(reg.replace_all(devices), 1);
        assert_eq!(reg.slot_value("1", "switch").as_deref(), Some("1"));
        assert!(reg.pending.is_empty());
    }

    #[test]
    fn rediscovery_replaces_rather_than_merges() {
        let reg = registry();
        let devices: IndexMap<_, _> = [(
            "5".to_owned(),
            device("5", "Fan", DeviceKind::Switch, &[("switch", "C5")]),
        )]
        .into_iter()
        .collect();
        reg.replace_all(devices);

        assert_eq!(reg.len(), 1);
        assert!(reg.device("1").is_none());
        assert_eq!(reg.apply_value("C1", "1", ValueSource::Push), 0);
    }

    #[test]
    fn set_by_connection_updates_first_binding_only() {
        let reg = registry();
        assert!(reg.set_value_by_connection("2", "C3", "80"));
        assert_eq!(reg.slot_value("2", "brightness").as_deref(), Some("80"));
        assert!(!reg.set_value_by_connection("2", "C1", "1"));
    }

    #[test]
    fn clear_forgets_topology() {
        let reg = registry();
        reg.clear();
        assert!(reg.is_empty());
        assert!(!reg.is_discovered());
        assert_eq!(reg.apply_value("C1", "1", ValueSource::Push), 0);
        assert_eq!(reg.pending.len(), 1);
    }
}
