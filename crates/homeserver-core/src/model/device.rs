// ── Device domain types ──

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// What a device is, as decided by the first matching template.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeviceKind {
    Light,
    Dimmer,
    Switch,
    Cover,
    Climate,
}

/// A named data point of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Server-side connection id. Fixed for the lifetime of the session.
    pub connection_id: String,
    /// Last known value; `None` until the server reports one.
    pub value: Option<String>,
}

impl Slot {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            value: None,
        }
    }
}

/// A classified device from the project topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    /// Raw backslash-delimited project path, e.g. `EG\Kitchen\Ceiling`.
    pub name: String,
    pub kind: DeviceKind,
    /// Logical slot name to slot, in template order.
    pub slots: IndexMap<String, Slot>,
}

impl Device {
    /// Name without its leading path segment.
    ///
    /// `EG\Kitchen\Ceiling` becomes `Kitchen Ceiling`. A name with no
    /// backslash is returned as is.
    pub fn display_name(&self) -> String {
        display_name(&self.name)
    }

    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

}

pub(crate) fn display_name(raw: &str) -> String {
    match raw.split_once('\\') {
        Some((_, rest)) => rest.split('\\').collect::<Vec<_>>().join(" "),
        None => raw.to_owned(),
    }
}

/// Notification that the server reported a slot value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotUpdate {
    pub device_id: String,
    pub slot: String,
    pub connection_id: String,
    pub value: String,
}
