mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use homeserver_config::Profile;
use homeserver_core::{Session, SessionConfig};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let Cli { global, command } = cli;

    match command {
        // Config commands don't need a server connection
        Command::Config(args) => commands::config_cmd::handle(args, &global),

        // Watch keeps the session alive across socket drops
        cmd @ Command::Watch(_) => {
            let session = Session::new(build_session_config(&global)?);
            tokio::select! {
                result = session.connect(true) => result?,
                _ = tokio::signal::ctrl_c() => {
                    session.disconnect().await;
                    return Ok(());
                }
            }
            let result = commands::dispatch(cmd, &session, &global).await;
            session.disconnect().await;
            result
        }

        cmd => {
            let config = build_session_config(&global)?;
            tracing::debug!(command = ?cmd, host = %config.host, "dispatching command");
            Session::oneshot(config, |session| async move {
                commands::dispatch(cmd, &session, &global).await
            })
            .await
        }
    }
}

/// Build a `SessionConfig` from the config file, profile, and CLI overrides.
///
/// Without a matching profile, `--host` (plus credentials from flags or
/// environment) is enough to run ad hoc.
fn build_session_config(global: &GlobalOpts) -> Result<SessionConfig, CliError> {
    let cfg = homeserver_config::load_config()?;
    let profile_name = global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into());

    let base = cfg.profiles.get(&profile_name);
    if base.is_none() {
        if global.profile.is_some() {
            return Err(commands::config_cmd::profile_not_found(profile_name, &cfg));
        }
        if global.host.is_none() {
            return Err(CliError::NoConfig {
                path: homeserver_config::config_path().display().to_string(),
            });
        }
    }

    // Flag > env > profile
    let merged = Profile {
        host: global
            .host
            .clone()
            .or_else(|| base.map(|p| p.host.clone()))
            .unwrap_or_default(),
        port: global.port.or_else(|| base.and_then(|p| p.port)),
        http_port: global.http_port.or_else(|| base.and_then(|p| p.http_port)),
        username: global
            .username
            .clone()
            .or_else(|| base.and_then(|p| p.username.clone())),
        password: base.and_then(|p| p.password.clone()),
        password_env: base.and_then(|p| p.password_env.clone()),
        connect_timeout: global.timeout.or_else(|| base.and_then(|p| p.connect_timeout)),
    };

    Ok(homeserver_config::profile_to_session_config(
        &cfg,
        &merged,
        &profile_name,
    )?)
}
