// src/main.rs - Resin printer host: serial core plus HTTP API
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;

use resin_host::communication::{HardwareSerial, SerialInterface, SimulatedPrinter};
use resin_host::config;
use resin_host::controller::PrinterController;
use resin_host::file_manager::FileManager;
use resin_host::printer::Printer;
use resin_host::web;

#[derive(Parser, Debug)]
#[command(name = "printer-host", version, about = "Resin printer control host")]
struct Args {
    /// Configuration file
    #[arg(default_value = "printer.toml")]
    config: String,
    /// Connect to the printer at startup
    #[arg(long)]
    connect: bool,
    /// Talk to a simulated board instead of the serial port
    #[arg(long)]
    simulate: bool,
    /// Log every command and reply
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .init();

    tracing::info!("Starting resin printer host");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loading configuration from: {}", args.config);

    let config = config::load_config(&args.config).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", args.config, e);
        tracing::error!("Please ensure the configuration file exists and is properly formatted");
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;

    tracing::info!("Serial: {} @ {} baud", config.serial.port, config.serial.baud);
    tracing::info!("Print files: {}", config.files.directory.display());

    let files = FileManager::new(&config.files);
    files.ensure_directory().await?;
    if let Err(e) = files.validate_directory().await {
        tracing::warn!("{}", e);
    }

    let interface: Arc<dyn SerialInterface> = if args.simulate {
        tracing::info!("Using simulated printer");
        Arc::new(SimulatedPrinter::default())
    } else {
        Arc::new(HardwareSerial)
    };
    let mut printer = Printer::new(PrinterController::new(&config, interface), files.clone());
    if args.connect {
        let outcome = printer.ensure_connected().await;
        if !outcome.success {
            tracing::warn!("Startup connect failed: {}", outcome.message);
        }
    }

    // Set up a channel for communication between Axum handlers and the printer task.
    let (printer_tx, printer_rx) = mpsc::channel(16);
    let printer_task = tokio::spawn(printer.run(printer_rx));

    let app = web::api::create_router(printer_tx, files, config.files.max_file_size);
    let listener = tokio::net::TcpListener::bind(&config.web.bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    // The router owned the last sender; the printer task now disconnects and exits.
    printer_task.await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
