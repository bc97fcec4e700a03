//! Command handlers, one module per command group.

pub mod config_cmd;
pub mod devices;
pub mod frames;
pub mod set;
pub mod watch;

use homeserver_core::Session;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Route a command that needs a live session to its handler.
pub async fn dispatch(cmd: Command, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => devices::handle(session, args, global).await,
        Command::Set(args) => set::handle(session, args, global).await,
        Command::Poll { device } => frames::poll(session, &device, global).await,
        Command::Raw { frame } => frames::raw(session, &frame, global).await,
        Command::Refresh => devices::refresh(session, global).await,
        Command::Watch(args) => watch::handle(session, args, global).await,
        // Config is handled before dispatch
        Command::Config(_) => unreachable!(),
    }
}
