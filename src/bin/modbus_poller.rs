// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Polling driver: reads the configured registers of the gateway on a fixed
// interval and stores the decoded measurements.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rust_modbus_gateway::config::{is_valid_ip_address, Config};
use rust_modbus_gateway::poller::{
    JsonLinesSink, LogSink, MeasurementSink, PollingDriver, TcpRegisterReader,
};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;

/// Periodic Modbus register poller
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// JSON-lines output file (overrides config file)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Run a single polling cycle and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose (debug) logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let config = Config::from_file(&args.config)?;
    let poller = &config.poller;
    if !is_valid_ip_address(&poller.server_address) {
        anyhow::bail!("Invalid poller server address: {}", poller.server_address);
    }
    let server: SocketAddr = (poller.server_address.as_str(), poller.server_port)
        .to_socket_addrs()?
        .next()
        .context("Poller server address did not resolve")?;

    let output = args.output.as_ref().or(poller.output.as_ref());
    let sink: Box<dyn MeasurementSink + Send> = match output {
        Some(path) => Box::new(JsonLinesSink::open(path)?),
        None => Box::new(LogSink),
    };

    let reader = TcpRegisterReader::connect(server, poller.slave_id)
        .await
        .with_context(|| format!("Failed to connect to Modbus server at {}", server))?;
    let classifier = config.address_space.classifier()?;
    let mut driver = PollingDriver::new(reader, sink, classifier, poller);

    if args.once {
        let stored = driver.poll_and_store(chrono::Local::now()).await?;
        info!("Stored {} measurements", stored);
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    let stopper = running.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, stopping poller");
            stopper.store(false, Ordering::SeqCst);
        }
    });

    driver.run(running).await;
    Ok(())
}
