//! MockItOut - CLI Entry Point

use anyhow::Result;
use clap::{ArgAction, Parser};
use mockitout::config::{ServerConfig, TlsSettings, EXAMPLE_MOCKS};
use mockitout::{MockServer, MocksConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mockitout",
    about = "Declarative HTTP mock server with request-aware response templates",
    version
)]
struct Args {
    /// Path to the routes file
    #[arg(short, long, env = "ROUTES_FILE", default_value = "mocks.yaml")]
    config: PathBuf,

    /// Address to listen on
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:443")]
    listen_addr: SocketAddr,

    /// Serve HTTPS
    #[arg(long, env = "ENABLE_TLS", default_value_t = true, action = ArgAction::Set)]
    enable_tls: bool,

    /// PEM certificate chain
    #[arg(long, env = "CERT_FILE")]
    cert_file: Option<PathBuf>,

    /// PEM private key
    #[arg(long, env = "KEY_FILE")]
    key_file: Option<PathBuf>,

    /// Generate a self-signed certificate at startup
    #[arg(long, env = "GEN_CERTS")]
    gen_certs: bool,

    /// Debug logging, including request headers and payloads
    #[arg(long, env = "DEBUG")]
    debug: bool,

    /// Turn logging off
    #[arg(long, env = "DISABLE_LOGGING")]
    disable_logging: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print an example routes file and exit
    #[arg(long)]
    print_config: bool,

    /// Validate the routes file and exit
    #[arg(long)]
    validate: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            listen_addr: self.listen_addr,
            mocks_file: self.config.clone(),
            tls: TlsSettings {
                enabled: self.enable_tls,
                cert_file: self.cert_file.clone(),
                key_file: self.key_file.clone(),
                generate: self.gen_certs,
            },
            debug: self.debug,
            disable_logging: self.disable_logging,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Print example config if requested
    if args.print_config {
        println!("{}", EXAMPLE_MOCKS);
        return Ok(());
    }

    let server_config = args.server_config();

    // Initialize logging
    if !server_config.disable_logging {
        let level = if server_config.debug {
            Level::DEBUG
        } else {
            args.log_level
        };
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    // Load configuration
    info!(path = ?server_config.mocks_file, "Loading routes file");
    let mocks = MocksConfig::from_file(&server_config.mocks_file)?;

    // Validate and exit if requested
    if args.validate {
        MockServer::new(mocks.clone())?;
        println!(
            "Configuration is valid ({} routes defined)",
            mocks.routes.len()
        );
        return Ok(());
    }

    server_config.validate()?;

    let server = Arc::new(MockServer::new(mocks)?);
    server.serve(&server_config).await?;

    Ok(())
}
