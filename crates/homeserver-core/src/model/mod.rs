// ── Domain model ──
//
// Devices as the rest of the client sees them: a classified kind, a
// display name, and named slots bound to server connection ids.

pub mod device;
pub mod template;

// ── Re-exports ──────────────────────────────────────────────────────

pub use device::{Device, DeviceKind, Slot, SlotUpdate};
pub use template::{DeviceTemplate, TemplateTable};
