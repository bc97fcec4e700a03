// ── Filter predicates for slot update streams ──

use crate::model::SlotUpdate;

/// Which updates a [`SlotUpdateStream`](super::SlotUpdateStream) yields.
pub enum UpdateFilter {
    All,
    Device(String),
    Connection(String),
    Custom(Box<dyn Fn(&SlotUpdate) -> bool + Send + Sync>),
}

impl UpdateFilter {
    pub fn matches(&self, update: &SlotUpdate) -> bool {
        match self {
            Self::All => true,
            Self::Device(id) => update.device_id == *id,
            Self::Connection(id) => update.connection_id == *id,
            Self::Custom(f) => f(update),
        }
    }
}
