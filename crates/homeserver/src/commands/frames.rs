//! Low-level frame commands: raw sends and legacy device polls.

use std::time::Duration;

use homeserver_core::Session;

use crate::cli::GlobalOpts;
use crate::commands::devices::print_device;
use crate::error::CliError;

/// How long a poll waits for the server's answer before printing.
const POLL_SETTLE: Duration = Duration::from_millis(500);

pub async fn raw(session: &Session, frame: &str, global: &GlobalOpts) -> Result<(), CliError> {
    if frame.contains('\0') {
        return Err(CliError::Validation {
            field: "frame".into(),
            reason: "must not contain NUL; the terminator is added on send".into(),
        });
    }
    if !session.send_raw(frame).await {
        return Err(CliError::CommandFailed {
            command: frame.to_owned(),
        });
    }
    if !global.quiet {
        eprintln!("✓ Sent {frame}");
    }
    Ok(())
}

pub async fn poll(session: &Session, device_id: &str, global: &GlobalOpts) -> Result<(), CliError> {
    if !session.poll_device(device_id).await {
        return Err(CliError::CommandFailed {
            command: format!("poll {device_id}"),
        });
    }

    tokio::time::sleep(POLL_SETTLE).await;
    match session.device(device_id) {
        Some(device) => print_device(&device, global),
        None => {
            tracing::warn!(device_id, "polled a device that is not in the project");
            Ok(())
        }
    }
}
