//! Live slot update stream.

use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use futures_util::StreamExt;
use owo_colors::OwoColorize;
use serde::Serialize;

use homeserver_core::{ConnectionState, Session, SlotUpdate, UpdateFilter};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

/// One printed update.
#[derive(Serialize)]
struct WatchEvent<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    update: &'a SlotUpdate,
}

fn render_event(
    event: &WatchEvent<'_>,
    session: &Session,
    global: &GlobalOpts,
    color: bool,
) -> Result<String, CliError> {
    let update = event.update;
    Ok(match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(event)?,
        OutputFormat::Plain => format!("{} {} {}", update.device_id, update.slot, update.value),
        OutputFormat::Table => {
            let time = event.timestamp.with_timezone(&Local).format("%H:%M:%S");
            let name = session
                .device_name(&update.device_id)
                .unwrap_or_else(|| update.device_id.clone());
            if color {
                format!(
                    "{} {} {} = {}",
                    time.dimmed(),
                    name.cyan(),
                    update.slot,
                    update.value.green()
                )
            } else {
                format!("{time} {name} {} = {}", update.slot, update.value)
            }
        }
    })
}

/// Print matching updates until Ctrl-C, the optional duration elapses,
/// or the session ends.
pub async fn handle(session: &Session, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let WatchArgs { device, duration } = args;
    let filter = device.map_or(UpdateFilter::All, UpdateFilter::Device);
    let mut updates = session.updates(filter);
    let mut state = session.connection_state();

    let deadline = async move {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = &mut deadline => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                if !global.quiet {
                    eprintln!("connection {current}");
                }
                if current == ConnectionState::LoggedIn {
                    tracing::info!("session live again");
                }
            }
            next = updates.next() => {
                let Some(update) = next else { break };
                let event = WatchEvent { timestamp: Utc::now(), update: &update };
                output::print_output(&render_event(&event, session, global, color)?, global.quiet);
            }
        }
    }
    Ok(())
}
