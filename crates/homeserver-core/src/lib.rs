// homeserver-core: Session state and device registry between homeserver-api and consumers.

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod session;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::SessionConfig;
pub use error::CoreError;
pub use session::{ConnectionState, Session};
pub use store::{DeviceRegistry, ValueSource};
pub use stream::{SlotUpdateStream, UpdateFilter};

pub use model::{Device, DeviceKind, DeviceTemplate, Slot, SlotUpdate, TemplateTable};
