use std::path::PathBuf;

use fixpix_session_core::api::commands::command_catalog;
use fixpix_session_core::api::server::serve;
use fixpix_session_core::config::AppConfig;
use fixpix_session_core::default_app_root;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConfigCliArgs {
    app_root: PathBuf,
    config_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    let (command, rest) = match cli_args.split_first() {
        Some((first, rest)) if !first.starts_with('-') => (first.as_str(), rest),
        _ => ("serve", cli_args.as_slice()),
    };
    if rest.iter().any(|arg| matches!(arg.as_str(), "-h" | "--help")) {
        print_usage();
        return Ok(());
    }

    match command {
        "serve" => {
            let parsed = parse_config_cli_args(rest)?;
            let config = AppConfig::load(parsed.app_root.as_path(), parsed.config_path.as_deref())?;
            serve(config).await?;
        }
        "show-config" => {
            let parsed = parse_config_cli_args(rest)?;
            let config = AppConfig::load(parsed.app_root.as_path(), parsed.config_path.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        "list-commands" => {
            println!("{}", serde_json::to_string_pretty(&command_catalog())?);
        }
        unknown => {
            return Err(std::io::Error::other(format!(
                "Unknown command: {unknown}\n\nUse --help for usage."
            ))
            .into());
        }
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

fn parse_config_cli_args(args: &[String]) -> Result<ConfigCliArgs, Box<dyn std::error::Error>> {
    let mut app_root = default_app_root();
    let mut config_path = None::<String>;
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> Result<String, Box<dyn std::error::Error>> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--app-root" => {
                app_root = PathBuf::from(needs_value(i)?);
                i += 2;
            }
            "--config" => {
                config_path = Some(needs_value(i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }

    let config_path = config_path
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    Ok(ConfigCliArgs {
        app_root,
        config_path,
    })
}

fn print_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  fixpix-session-core [serve] [--app-root PATH] [--config PATH]\n",
        "  fixpix-session-core show-config [--app-root PATH] [--config PATH]\n",
        "  fixpix-session-core list-commands\n\n",
        "Defaults:\n",
        "  settings file: <app-root>/config/fixpix.settings.toml (fallback: .json)\n",
        "  FIXPIX_* environment variables override the settings file\n",
        "  RUST_LOG controls log verbosity (default: info)\n"
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_args_defaults_to_no_explicit_file() {
        let parsed = parse_config_cli_args(&[]).expect("parse should succeed");
        assert_eq!(parsed.config_path, None);
    }

    #[test]
    fn parse_config_args_accepts_root_and_file() {
        let parsed = parse_config_cli_args(&[
            String::from("--app-root"),
            String::from("/srv/fixpix"),
            String::from("--config"),
            String::from("custom.toml"),
        ])
        .expect("parse should succeed");
        assert_eq!(parsed.app_root, PathBuf::from("/srv/fixpix"));
        assert_eq!(parsed.config_path.as_deref(), Some("custom.toml"));
    }

    #[test]
    fn parse_config_args_requires_flag_values() {
        let err = parse_config_cli_args(&[String::from("--config")]).expect_err("value should be required");
        assert!(err.to_string().contains("--config"));
    }

    #[test]
    fn parse_config_args_rejects_unknown_flags() {
        let err = parse_config_cli_args(&[String::from("--verbose")]).expect_err("unknown flag");
        assert!(err.to_string().contains("Unknown argument"));
    }
}
