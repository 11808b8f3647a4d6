//! Config subcommand handlers.

use serde::Serialize;
use tabled::Tabled;

use jmxrest_config::{Config, Defaults, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of `cfg` with every plaintext secret masked.
fn redacted(cfg: &Config) -> Config {
    let mask = |secret: &Option<String>| secret.as_ref().map(|_| MASK.to_owned());
    Config {
        default_profile: cfg.default_profile.clone(),
        defaults: Defaults {
            read_timeout_ms: cfg.defaults.read_timeout_ms,
            trust_store_type: cfg.defaults.trust_store_type.clone(),
        },
        profiles: cfg
            .profiles
            .iter()
            .map(|(name, p)| {
                let profile = Profile {
                    password: mask(&p.password),
                    trust_store_password: mask(&p.trust_store_password),
                    ..p.clone()
                };
                (name.clone(), profile)
            })
            .collect(),
    }
}

fn format_config(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("# failed to render config: {e}"))
}

fn profile_not_found(cfg: &Config, name: String) -> CliError {
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

fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

#[derive(Serialize, Tabled)]
struct ProfileRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Port")]
    port: u16,
    #[tabled(rename = "Auth")]
    auth: &'static str,
    #[tabled(rename = "Default")]
    default: String,
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config_or_default());
            let out = output::render_single(global.output, &cfg, format_config, |_| {
                config::config_path().display().to_string()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            if cfg.profiles.is_empty() {
                if !global.quiet {
                    eprintln!("No profiles configured. Run: jmxrest config add <NAME> --host <HOST>");
                }
                return Ok(());
            }
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            let mut rows: Vec<ProfileRow> = cfg
                .profiles
                .iter()
                .map(|(name, p)| ProfileRow {
                    name: name.clone(),
                    host: p.host.clone(),
                    port: p.port,
                    auth: if p.username.is_some() { "basic" } else { "advanced" },
                    default: if name == default { "*".into() } else { String::new() },
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));

            let out = output::render_list(
                global.output,
                &rows,
                |r| ProfileRow {
                    name: r.name.clone(),
                    host: r.host.clone(),
                    port: r.port,
                    auth: r.auth,
                    default: r.default.clone(),
                },
                |r| r.name.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Add {
            name,
            host,
            port,
            username,
            trust_store,
        } => {
            let mut cfg = config::load_config_or_default();
            let first = cfg.profiles.is_empty();

            let profile = Profile {
                host,
                port,
                username,
                trust_store,
                ..Profile::default()
            };
            cfg.profiles.insert(name.clone(), profile);
            if first {
                cfg.default_profile = Some(name.clone());
            }
            config::save_config(&cfg)?;

            if !global.quiet {
                eprintln!("✓ Profile '{name}' saved to {}", config::config_path().display());
                if first {
                    eprintln!("  Default profile set to '{name}'");
                }
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(profile_not_found(&cfg, name));
            }

            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Default profile set to '{name}'");
            }
            Ok(())
        }

        ConfigCommand::SetPassword { profile, trust_store } => {
            let cfg = config::load_config_or_default();
            let profile_name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            if !cfg.profiles.contains_key(&profile_name) {
                return Err(profile_not_found(&cfg, profile_name));
            }

            let label = if trust_store { "Trust store password" } else { "Password" };
            let secret = rpassword::prompt_password(format!("{label}: ")).map_err(prompt_err)?;
            if secret.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }

            if trust_store {
                jmxrest_config::store_trust_store_password(&profile_name, &secret)?;
            } else {
                jmxrest_config::store_password(&profile_name, &secret)?;
            }
            if !global.quiet {
                eprintln!("✓ {label} for '{profile_name}' stored in system keyring");
            }
            Ok(())
        }
    }
}
