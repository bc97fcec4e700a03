//! Device command handlers.

use std::time::Duration;

use tabled::Tabled;

use homeserver_core::{CoreError, Device, Session};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Slots")]
    slots: String,
}

fn device_row(d: &Device, color: bool) -> DeviceRow {
    let slots = d
        .slots
        .iter()
        .map(|(name, slot)| format!("{name}={}", output::value_cell(slot.value.as_deref(), color)))
        .collect::<Vec<_>>()
        .join(", ");
    DeviceRow {
        id: output::ident(&d.id, color),
        name: d.display_name(),
        kind: d.kind.to_string(),
        slots,
    }
}

#[derive(Tabled)]
struct SlotRow {
    #[tabled(rename = "Slot")]
    name: String,
    #[tabled(rename = "Connection")]
    connection: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn detail(d: &Device, color: bool) -> String {
    let rows: Vec<SlotRow> = d
        .slots
        .iter()
        .map(|(name, slot)| SlotRow {
            name: name.clone(),
            connection: output::ident(&slot.connection_id, color),
            value: output::value_cell(slot.value.as_deref(), color),
        })
        .collect();

    [
        format!("ID:    {}", output::ident(&d.id, color)),
        format!("Name:  {}", d.display_name()),
        format!("Path:  {}", d.name),
        format!("Kind:  {}", d.kind),
        output::render_table(&rows),
    ]
    .join("\n")
}

/// Give the server time to answer the initial value request.
async fn settle(wait_ms: u64) {
    if wait_ms > 0 {
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;
    }
}

pub(crate) fn find_device(session: &Session, device_id: &str) -> Result<Device, CliError> {
    session.device(device_id).ok_or_else(|| {
        CoreError::DeviceNotFound {
            device_id: device_id.to_owned(),
        }
        .into()
    })
}

pub(crate) fn print_device(device: &Device, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        device,
        |d| detail(d, color),
        |d| d.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn handle(session: &Session, args: DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List { kind, wait_ms } => {
            settle(wait_ms).await;
            let color = output::should_color(&global.color);
            let devices: Vec<Device> = session.devices(kind).into_values().collect();
            let out = output::render_list(
                &global.output,
                &devices,
                |d| device_row(d, color),
                |d| d.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Get { device, wait_ms } => {
            settle(wait_ms).await;
            let device = find_device(session, &device)?;
            print_device(&device, global)
        }
    }
}

/// Download the project again and report how many devices it holds.
pub async fn refresh(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let count = session.discover_devices().await?;
    output::print_output(&count.to_string(), global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use homeserver_core::{DeviceKind, Slot};

    fn device() -> Device {
        let mut switch = Slot::new("C1");
        switch.value = Some("1".into());
        Device {
            id: "7".into(),
            name: r"EG\Hall\Spots".into(),
            kind: DeviceKind::Dimmer,
            slots: [
                ("switch".to_owned(), switch),
                ("brightness".to_owned(), Slot::new("C2")),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn row_lists_slot_values_in_order() {
        let row = device_row(&device(), false);
        assert_eq!(row.name, "Hall Spots");
        assert_eq!(row.kind, "dimmer");
        assert_eq!(row.slots, "switch=1, brightness=-");
    }

    #[test]
    fn detail_shows_raw_path_and_connections() {
        let text = detail(&device(), false);
        assert!(text.contains(r"Path:  EG\Hall\Spots"));
        assert!(text.contains("C2"));
    }
}
