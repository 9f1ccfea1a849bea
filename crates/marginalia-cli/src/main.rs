//! Marginalia CLI
//!
//! Command-line front end for the Marginalia relay. This binary spawns
//! the native messaging host, reads UI requests as JSON lines on stdin,
//! and prints each reassembled result as a JSON line on stdout.

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod frontend;

/// Marginalia - relay save/search requests to a native messaging host
///
/// Wrap your host command to exchange correlated request/response
/// messages with it over native messaging framing.
#[derive(Parser, Debug)]
#[command(name = "marginalia")]
#[command(version, about, long_about = None)]
struct Args {
    /// Output format: text or json
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Host name for identification in logs
    #[arg(short, long)]
    name: Option<String>,

    /// The host command and arguments to run
    #[arg(trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.command.is_empty() {
        eprintln!("Error: No host command specified");
        eprintln!("Usage: marginalia [OPTIONS] -- <host-command> [args...]");
        return ExitCode::FAILURE;
    }

    let command = &args.command[0];
    let cmd_args: Vec<&str> = args.command[1..].iter().map(|s| s.as_str()).collect();
    let json_output = matches!(args.format, OutputFormat::Json);

    let host_name = args.name.unwrap_or_else(|| {
        // Fall back to the host command's file name
        std::path::Path::new(command)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "host".to_string())
    });

    tracing::info!("Starting Marginalia relay for '{}'", host_name);

    match frontend::run_relay_session(command, &cmd_args, &host_name, json_output).await {
        Ok(exit_code) => match u8::try_from(exit_code) {
            Ok(0) => ExitCode::SUCCESS,
            Ok(code) => ExitCode::from(code),
            // Out of the 0-255 range a process can report; anything else
            // collapses to a plain failure rather than wrapping around.
            Err(_) => ExitCode::FAILURE,
        },
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
