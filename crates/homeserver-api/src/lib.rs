// homeserver-api: Async Rust client for the HomeServer QUAD socket protocol

pub mod auth;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod topology;

pub use connection::{Connection, LoginOutcome};
pub use error::Error;
pub use protocol::{Command, Frame, Message};
pub use topology::{ProjectClient, RawDevice};
