// Voicewire session runner
// Runs one realtime voice session per invocation. A fatal signaling failure
// exits nonzero so a supervisor can decide whether to restart.

use std::env;
use std::process::ExitCode;

use anyhow::Context;

use voicewire::config::VoicewireConfig;
use voicewire::session::VoiceSession;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    voicewire::init_logging();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<String> = None;
    let mut print_config = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config_path = Some(
                    args.get(i)
                        .context("--config requires a path argument")?
                        .clone(),
                );
            }
            "--print-config" => print_config = true,
            "--help" | "-h" => {
                eprintln!("Usage: voicewire [--config <path>] [--print-config]");
                return Ok(ExitCode::SUCCESS);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                eprintln!("Usage: voicewire [--config <path>] [--print-config]");
                return Ok(ExitCode::FAILURE);
            }
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => {
            let mut config = VoicewireConfig::load_from_file(&path)
                .with_context(|| format!("Failed to load config from {}", path))?;
            config.apply_env();
            config
        }
        None => VoicewireConfig::load_or_default(),
    };

    if print_config {
        let mut printable = config.clone();
        if !printable.session.api_key.is_empty() {
            printable.session.api_key = "<set>".to_string();
        }
        println!("{}", toml::to_string_pretty(&printable)?);
        return Ok(ExitCode::SUCCESS);
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Invalid configuration")?;

    if config.session.api_key.is_empty() {
        anyhow::bail!("No API key configured; set VOICEWIRE_API_KEY or session.api_key");
    }

    let session = VoiceSession::connect(config).await?;
    let session_id = session.id();
    log::info!("Session {} connected, running", session_id);

    tokio::select! {
        result = session.run() => {
            match result {
                Ok(()) => {
                    log::info!("Session {} finished", session_id);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) if e.is_fatal() => {
                    // The signaling exchange has no in-session recovery; exit
                    // nonzero and let the supervisor restart the process.
                    log::error!("Fatal signaling failure: {}", e);
                    Ok(ExitCode::from(2))
                }
                Err(e) => Err(e).context("Session failed"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, shutting down session {}", session_id);
            Ok(ExitCode::SUCCESS)
        }
    }
}
