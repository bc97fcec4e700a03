//! Slot write handler.

use homeserver_core::{CoreError, Session};

use crate::cli::{GlobalOpts, SetArgs};
use crate::commands::devices::find_device;
use crate::error::CliError;

pub async fn handle(session: &Session, args: SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let device = find_device(session, &args.device)?;
    let Some(slot) = device.slot(&args.slot) else {
        return Err(CoreError::SlotNotFound {
            device_id: args.device,
            slot: args.slot,
        }
        .into());
    };
    tracing::debug!(
        device = %device.id,
        slot = %args.slot,
        connection = %slot.connection_id,
        "writing slot"
    );

    if !session.set_slot(&args.device, &args.slot, &args.value).await {
        return Err(CliError::CommandFailed {
            command: format!("set {} {} {}", args.device, args.slot, args.value),
        });
    }

    if !global.quiet {
        eprintln!(
            "✓ {} {} = {}",
            device.display_name(),
            args.slot,
            args.value
        );
    }
    Ok(())
}
