/// duochat directory server
///
/// Main server entry point. Handles:
/// - Command-line argument parsing
/// - Store initialization
/// - HTTP server startup
use actix_web::web;
use duochat_server::{config::Config, server, store};
use std::fs;
use std::process;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    let config = Config::from_args();

    log::info!("Starting duochat directory server");
    log::info!("Port: {}", config.port);

    // Write PID file if specified
    if let Some(pidfile) = &config.pidfile {
        fs::write(pidfile, process::id().to_string())?;
        log::info!("PID file written to: {:?}", pidfile);
    }

    let pool = web::Data::new(store::create_pool());
    log::info!("Directory store initialized (in memory)");

    let bind_addr = config.bind_addr();
    log::info!("Starting HTTP server on {}", bind_addr);

    server::create_http_server(pool, &bind_addr)?.await
}
