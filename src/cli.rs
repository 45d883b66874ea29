//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Certificate-based request authentication gateway
#[derive(Parser, Debug)]
#[command(name = "certgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "CERTGATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "CERTGATE_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "CERTGATE_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "CERTGATE_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "CERTGATE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the server (default)
    Serve,

    /// Decode a certificate and print its encoding, fingerprint and subject
    Inspect {
        /// Certificate file (PEM, DER, or a saved header value)
        #[arg(required_unless_present = "value")]
        file: Option<PathBuf>,

        /// Header value to decode instead of a file
        #[arg(long, conflicts_with = "file")]
        value: Option<String>,
    },
}
