//! Config subcommand handlers.

use serde::Serialize;
use tabled::Tabled;

use homeserver_config::{self as config, Config, Profile};
use homeserver_core::DeviceTemplate;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

pub(crate) fn profile_not_found(name: String, cfg: &Config) -> CliError {
    let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
    available.sort();
    CliError::ProfileNotFound {
        name,
        available: if available.is_empty() {
            "(none)".into()
        } else {
            available.join(", ")
        },
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("'{value}' is not a valid number"),
    })
}

/// A template with its position in the table.
#[derive(Serialize)]
struct TemplateEntry<'a> {
    position: usize,
    #[serde(flatten)]
    template: &'a DeviceTemplate,
}

#[derive(Tabled)]
struct TemplateRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Slots")]
    slots: String,
}

fn template_row(entry: &TemplateEntry<'_>) -> TemplateRow {
    let slots = entry
        .template
        .slots
        .iter()
        .map(|(logical, xml)| {
            if logical == xml {
                logical.clone()
            } else {
                format!("{logical}={xml}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    TemplateRow {
        position: entry.position,
        kind: entry.template.kind.to_string(),
        slots,
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = config::load_config()?;
            for profile in cfg.profiles.values_mut() {
                if profile.password.is_some() {
                    profile.password = Some("********".into());
                }
            }
            let out = output::render_single(
                &global.output,
                &cfg,
                |c| format!("{c:#?}"),
                |_| config::config_path().display().to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Templates => {
            let cfg = config::load_config()?;
            let table = cfg.template_table();
            let entries: Vec<_> = table
                .iter()
                .enumerate()
                .map(|(i, template)| TemplateEntry {
                    position: i + 1,
                    template,
                })
                .collect();
            let out = output::render_list(
                &global.output,
                &entries,
                template_row,
                |e| e.template.kind.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config_or_default();
            let profile_name = active_profile_name(global, &cfg);
            let profile = cfg
                .profiles
                .entry(profile_name.clone())
                .or_insert_with(Profile::default);

            match key.as_str() {
                "host" => profile.host = value,
                "port" => profile.port = Some(parse_number("port", &value)?),
                "http_port" | "http-port" => {
                    profile.http_port = Some(parse_number("http_port", &value)?);
                }
                "username" => profile.username = Some(value),
                "password_env" | "password-env" => profile.password_env = Some(value),
                "connect_timeout" | "connect-timeout" => {
                    profile.connect_timeout = Some(parse_number("connect_timeout", &value)?);
                }
                other => {
                    return Err(CliError::Validation {
                        field: other.into(),
                        reason: format!(
                            "unknown config key '{other}'. Valid keys: host, port, \
                             http_port, username, password_env, connect_timeout"
                        ),
                    });
                }
            }

            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Set {key} on profile '{profile_name}'");
            }
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: homeserver config set host <host>");
                return Ok(());
            }
            let mut names: Vec<_> = cfg.profiles.keys().collect();
            names.sort();
            for name in names {
                let marker = if name == default { " *" } else { "" };
                println!("{name}{marker}");
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(profile_not_found(name, &cfg));
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Default profile set to '{name}'");
            }
            Ok(())
        }

        ConfigCommand::SetPassword { password } => {
            let cfg = config::load_config_or_default();
            let profile_name = active_profile_name(global, &cfg);
            if !cfg.profiles.contains_key(&profile_name) {
                return Err(profile_not_found(profile_name, &cfg));
            }
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "value cannot be empty".into(),
                });
            }

            config::store_password(&profile_name, &password)?;
            if !global.quiet {
                eprintln!("✓ Password stored in system keyring for profile '{profile_name}'");
            }
            Ok(())
        }
    }
}
