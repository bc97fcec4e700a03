// ── Device templates ──
//
// A template says which XML slot names make a device of a given kind and
// what each of them is called once classified. The installation decides
// the slot vocabulary, so the table is data rather than code.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::device::DeviceKind;

/// Slot vocabulary for one device kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTemplate {
    pub kind: DeviceKind,
    /// Logical slot name to XML slot name.
    pub slots: IndexMap<String, String>,
}

impl DeviceTemplate {
    pub fn new<L, X>(kind: DeviceKind, slots: impl IntoIterator<Item = (L, X)>) -> Self
    where
        L: Into<String>,
        X: Into<String>,
    {
        Self {
            kind,
            slots: slots
                .into_iter()
                .map(|(logical, xml)| (logical.into(), xml.into()))
                .collect(),
        }
    }

    /// Template whose logical names equal the XML slot names.
    pub fn with_slots<S: Into<String> + Clone>(
        kind: DeviceKind,
        slots: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(kind, slots.into_iter().map(|s| (s.clone(), s)))
    }

    /// Whether any of this template's XML slots appears in `connections`.
    pub fn matches(&self, connections: &IndexMap<String, String>) -> bool {
        self.slots.values().any(|xml| connections.contains_key(xml))
    }
}

/// Ordered list of templates; the first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateTable(Vec<DeviceTemplate>);

impl TemplateTable {
    pub fn new(templates: Vec<DeviceTemplate>) -> Self {
        Self(templates)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceTemplate> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First template matching `connections`, in declaration order.
    pub fn classify(&self, connections: &IndexMap<String, String>) -> Option<&DeviceTemplate> {
        self.0.iter().find(|t| t.matches(connections))
    }
}

impl Default for TemplateTable {
    fn default() -> Self {
        Self(vec![
            DeviceTemplate::new(DeviceKind::Light, [("switch", "switch")]),
            DeviceTemplate::new(
                DeviceKind::Dimmer,
                [("switch", "dim_s"), ("brightness", "dim_val")],
            ),
            DeviceTemplate::new(DeviceKind::Switch, [("switch", "slot_switch")]),
            DeviceTemplate::new(
                DeviceKind::Cover,
                [
                    ("short", "slot_short"),
                    ("long", "slot_long"),
                    ("position", "slot_position"),
                ],
            ),
            DeviceTemplate::new(
                DeviceKind::Climate,
                [("target", "slot_targetvalue"), ("current", "slot_temp_actual")],
            ),
        ])
    }
}

impl From<Vec<DeviceTemplate>> for TemplateTable {
    fn from(templates: Vec<DeviceTemplate>) -> Self {
        Self(templates)
    }
}
