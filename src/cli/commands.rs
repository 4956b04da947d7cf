use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::CONFIG_FILE_NAME;

#[derive(Parser)]
#[command(name = "modeflow")]
#[command(author, version, about = "Confidence-routed mode engine for conversational assistants", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Path to the configuration file (default: ./modeflow.toml)
    #[arg(short, long, global = true, env = "MODEFLOW_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
    }
}

/// Output format for CLI results.
/// - Text: Human-readable text output (default)
/// - Json: JSON documents; `chat` writes one object per line
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read lines from stdin and answer each through the engine
    Chat {
        /// Session ID (random if not specified)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Show how an input would be routed, without activating anything
    Route {
        /// Input text to score
        input: String,
    },

    /// List registered modes
    Modes,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write the default configuration to the config path
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}
