// ── Topology-to-domain conversion ──
//
// Turns the raw `<device>` entries of the project file into classified
// `Device`s using the template table. Devices no template recognises are
// dropped.

use indexmap::IndexMap;
use tracing::debug;

use homeserver_api::RawDevice;

use crate::model::{Device, DeviceTemplate, Slot, TemplateTable};

/// Classify raw devices, keyed by device id.
///
/// Output is deterministic for a given input and table. When two entries
/// share an id the later one replaces the earlier.
pub fn classify(raw: Vec<RawDevice>, templates: &TemplateTable) -> IndexMap<String, Device> {
    let mut devices = IndexMap::with_capacity(raw.len());

    for entry in raw {
        let Some(template) = templates.classify(&entry.connections) else {
            debug!(device_id = %entry.id, name = %entry.name, "no template matches device");
            continue;
        };

        let device = build_device(entry, template);
        if let Some(previous) = devices.insert(device.id.clone(), device) {
            debug!(device_id = %previous.id, "device id repeated in project, keeping the later entry");
        }
    }

    devices
}

fn build_device(entry: RawDevice, template: &DeviceTemplate) -> Device {
    let slots = template
        .slots
        .iter()
        .filter_map(|(logical, xml)| {
            entry
                .connections
                .get(xml)
                .map(|connection_id| (logical.clone(), Slot::new(connection_id.as_str())))
        })
        .collect();

    Device {
        id: entry.id,
        name: entry.name,
        kind: template.kind,
        slots,
    }
}
