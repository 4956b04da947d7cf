use std::collections::HashMap;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use uuid::Uuid;

use modeflow::cli::{Cli, Commands, ConfigAction, Display, OutputFormat};
use modeflow::config::EngineConfig;
use modeflow::engine::{ModeEngine, ModeEngineBuilder};
use modeflow::error::Result;
use modeflow::mode::ModeConfig;

/// Context for command output handling.
struct OutputContext<'a> {
    display: &'a Display,
    format: OutputFormat,
}

#[derive(Serialize)]
struct ModeListing<'a> {
    #[serde(flatten)]
    config: &'a ModeConfig,
    enabled: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            Display::new().print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("modeflow=debug")
    } else {
        EnvFilter::new("modeflow=info")
    };

    // stdout carries command output (including JSON), so logs go to stderr.
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let display = Display::new();
    let out = OutputContext {
        display: &display,
        format: cli.output,
    };
    let config_path = cli.config_path();

    match cli.command {
        Commands::Chat { session } => cmd_chat(&out, &config_path, session).await,
        Commands::Route { input } => cmd_route(&out, &config_path, &input).await,
        Commands::Modes => cmd_modes(&out, &config_path).await,
        Commands::Config { action } => cmd_config(&out, &config_path, action).await,
    }
}

async fn build_engine(config_path: &Path) -> Result<ModeEngine> {
    let config = EngineConfig::load(config_path).await?;
    ModeEngineBuilder::from_config(config)?.build()
}

async fn cmd_chat(out: &OutputContext<'_>, config_path: &Path, session: Option<String>) -> Result<()> {
    let engine = build_engine(config_path).await?;
    let session_id = session.unwrap_or_else(|| Uuid::new_v4().to_string());

    if out.format == OutputFormat::Text {
        out.display.print_info(&format!(
            "Session {} (/history, /metrics, /reset, /quit)",
            session_id
        ));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/history" => {
                let history = engine.mode_history(&session_id);
                match out.format {
                    OutputFormat::Text => out.display.print_history(&history),
                    OutputFormat::Json => println!("{}", serde_json::to_string(&history)?),
                }
                continue;
            }
            "/reset" => {
                let forgotten = engine.forget_session(&session_id).await;
                match out.format {
                    OutputFormat::Text => out.display.print_info("Session reset"),
                    OutputFormat::Json => {
                        println!("{}", serde_json::json!({ "reset": forgotten }))
                    }
                }
                continue;
            }
            "/metrics" => {
                let snapshot = engine.metrics_snapshot();
                match out.format {
                    OutputFormat::Text => out.display.print_metrics(&snapshot),
                    OutputFormat::Json => println!("{}", serde_json::to_string(&snapshot)?),
                }
                continue;
            }
            _ => {}
        }

        let result = engine.submit(&session_id, input, HashMap::new()).await;
        match out.format {
            OutputFormat::Text => {
                let mode = result
                    .mode_id
                    .as_ref()
                    .and_then(|id| engine.registry().get(id.as_str()));
                out.display
                    .print_result(&result, mode.as_ref().map(|p| p.config()));
            }
            OutputFormat::Json => println!("{}", serde_json::to_string(&result)?),
        }
    }

    engine.shutdown().await;
    if out.format == OutputFormat::Text {
        println!();
        out.display.print_metrics(&engine.metrics_snapshot());
    }
    Ok(())
}

async fn cmd_route(out: &OutputContext<'_>, config_path: &Path, input: &str) -> Result<()> {
    let engine = build_engine(config_path).await?;
    let decision = engine.route("cli", input).await;

    match out.format {
        OutputFormat::Text => out.display.print_decision(&decision),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&decision)?),
    }
    Ok(())
}

async fn cmd_modes(out: &OutputContext<'_>, config_path: &Path) -> Result<()> {
    let engine = build_engine(config_path).await?;
    let registry = engine.registry();
    let plugins = registry.all();

    match out.format {
        OutputFormat::Text => {
            let modes: Vec<(ModeConfig, bool)> = plugins
                .iter()
                .map(|p| (p.config().clone(), registry.is_enabled(p.id().as_str())))
                .collect();
            out.display.print_header("Modes");
            out.display.print_modes(&modes);
        }
        OutputFormat::Json => {
            let listing: Vec<ModeListing<'_>> = plugins
                .iter()
                .map(|p| ModeListing {
                    config: p.config(),
                    enabled: registry.is_enabled(p.id().as_str()),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
    }
    Ok(())
}

async fn cmd_config(out: &OutputContext<'_>, config_path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = EngineConfig::load(config_path).await?;
            match out.format {
                OutputFormat::Text => {
                    let text = toml::to_string_pretty(&config)
                        .map_err(|e| modeflow::ModeError::Config(e.to_string()))?;
                    println!("{}", text);
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                }
            }
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                return Err(modeflow::ModeError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                )));
            }
            if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            let config = EngineConfig::default();
            config.save(config_path).await?;
            match out.format {
                OutputFormat::Text => out.display.print_success(&format!(
                    "Wrote default configuration to {}",
                    config_path.display()
                )),
                OutputFormat::Json => {
                    let report = serde_json::json!({
                        "path": config_path,
                        "modes": config.modes.len(),
                    });
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
        }
        ConfigAction::Validate => {
            let exists = config_path.exists();
            let config = EngineConfig::load(config_path).await?;
            match out.format {
                OutputFormat::Text => {
                    if !exists {
                        out.display.print_warning(&format!(
                            "{} not found; using defaults",
                            config_path.display()
                        ));
                    }
                    out.display.print_success(&format!(
                        "Configuration is valid ({} modes)",
                        config.modes.len()
                    ));
                }
                OutputFormat::Json => {
                    let report = serde_json::json!({
                        "valid": true,
                        "path": config_path,
                        "exists": exists,
                        "modes": config.modes.len(),
                    });
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
        }
    }
    Ok(())
}
