//! certgate - certificate-based request authentication gateway

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use certgate::{
    certauth::{PresentedCertificate, SourceEncoding},
    cli::{Cli, Command},
    config::Config,
    server, setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Inspect { ref file, ref value }) => {
            run_inspect(file.as_deref(), value.as_deref())
        }
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Decode one certificate and print what the filter would see
fn run_inspect(file: Option<&Path>, value: Option<&str>) -> ExitCode {
    let presented = match (file, value) {
        (_, Some(v)) => PresentedCertificate::from_header_value(v),
        (Some(path), None) => match std::fs::read(path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => PresentedCertificate::from_header_value(&text),
                Err(e) => PresentedCertificate::from_der(e.into_bytes(), SourceEncoding::Der),
            },
            Err(e) => {
                eprintln!("❌ Failed to read {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        (None, None) => {
            eprintln!("❌ Nothing to inspect");
            return ExitCode::FAILURE;
        }
    };

    match presented {
        Ok(cert) => {
            println!("Encoding:    {}", cert.encoding);
            println!("Fingerprint: {}", cert.fingerprint);
            println!("Subject:     {}", cert.subject);
            match cert.subject.country() {
                Some(c) => println!("Country:     {c}"),
                None => println!("Country:     <missing>"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Failed to decode certificate: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the server
async fn run_server(cli: Cli) -> ExitCode {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        trusted_certificates = config.trust_store.certificates.len(),
        "Starting certgate"
    );

    if let Err(e) = server::run(config).await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
