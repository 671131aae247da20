// CLI entry point for the mahjong table server.
//
// Serves one table on the calling thread until killed. See `server.rs` for
// the networking architecture and `session.rs` for the game phases.
//
// Usage:
//   mahjong-server [OPTIONS]
//     --config <FILE>   JSON config file (flags below override it)
//     --host <HOST>     Listen address (default: 127.0.0.1)
//     --port <PORT>     Listen port (default: 1246)
//
// Logging goes to stderr and is filtered with `RUST_LOG`
// (default: `mahjong_server=info`).

use std::path::PathBuf;

use mahjong_server::{ServerConfig, run_server};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mahjong_server=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = parse_args();

    if let Err(e) = run_server(config) {
        error!(error = %e, "server failed");
        std::process::exit(1);
    }
}

/// Command-line overrides, applied on top of the config file.
#[derive(Default)]
struct Args {
    config: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
}

/// Parse command-line arguments into a `ServerConfig`. Uses simple
/// `std::env::args()` matching.
fn parse_args() -> ServerConfig {
    let mut parsed = Args::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                parsed.config = Some(args.get(i).map(PathBuf::from).unwrap_or_else(|| {
                    eprintln!("--config requires a file path");
                    std::process::exit(1);
                }));
            }
            "--host" => {
                i += 1;
                parsed.host = Some(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--host requires a value");
                    std::process::exit(1);
                }));
            }
            "--port" => {
                i += 1;
                parsed.port = Some(args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                }));
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let mut config = match &parsed.config {
        Some(path) => ServerConfig::load(path).unwrap_or_else(|e| {
            eprintln!("{e}");
            std::process::exit(1);
        }),
        None => ServerConfig::default(),
    };
    if let Some(host) = parsed.host {
        config.host = host;
    }
    if let Some(port) = parsed.port {
        config.port = port;
    }
    config
}

fn print_usage() {
    println!("Usage: mahjong-server [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <FILE>   JSON config file (flags below override it)");
    println!("  --host <HOST>     Listen address (default: 127.0.0.1)");
    println!("  --port <PORT>     Listen port (default: 1246)");
    println!("  --help, -h        Show this help");
}
