// ── Device registry ──
//
// Concurrent device/slot storage with push-based change notification.

mod apply;
mod registry;

pub use apply::ValueSource;
pub use registry::DeviceRegistry;
