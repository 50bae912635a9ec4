use std::env;

use crate::scanner::ScannerCommand;

fn default_subdomain_command() -> ScannerCommand {
    ScannerCommand::new(
        "python3",
        ["scanners/subdomain_enum.py".to_string()],
    )
}

fn default_port_command() -> ScannerCommand {
    ScannerCommand::new("python3", ["scanners/port_scanner.py".to_string()])
}

/// Server configuration loaded from environment variables.
///
/// `DATABASE_URL` and `REDIS_URL` are optional on purpose: without them
/// the server runs on in-process stand-ins, which is what the test suite
/// and local development use.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,

    pub database_url: Option<String>,
    pub redis_url: Option<String>,

    /// Command line for the subdomain enumeration scanner.
    pub subdomain_scanner: ScannerCommand,
    /// Command line for the per-host port scanner.
    pub port_scanner: ScannerCommand,
    /// Cap on subdomains handed to the port scanner per scan.
    pub max_port_scan_targets: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(8000),

            database_url: env::var("DATABASE_URL").ok(),
            redis_url: env::var("REDIS_URL").ok(),

            subdomain_scanner: env::var("SUBDOMAIN_SCANNER_CMD")
                .ok()
                .and_then(|raw| ScannerCommand::parse(&raw))
                .unwrap_or_else(default_subdomain_command),
            port_scanner: env::var("PORT_SCANNER_CMD")
                .ok()
                .and_then(|raw| ScannerCommand::parse(&raw))
                .unwrap_or_else(default_port_command),
            max_port_scan_targets: env::var("MAX_PORT_SCAN_TARGETS")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(3),
        }
    }
}
