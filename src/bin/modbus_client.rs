// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use clap::{Parser, ValueEnum};
use std::error::Error;
use std::net::SocketAddr;
use tokio::time::Duration;
use tokio_modbus::prelude::*;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Bank {
    Input,
    Holding,
}

/// Modbus client reading registers from the gateway
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Modbus server address
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Modbus server port
    #[clap(long, default_value = "5020")]
    port: u16,

    /// Unit identifier
    #[clap(long, default_value = "1")]
    slave: u8,

    /// Register bank to read
    #[clap(long, value_enum, default_value = "input")]
    bank: Bank,

    /// Starting register address
    #[clap(long, default_value = "0")]
    register: u16,

    /// Number of registers to read
    #[clap(long, default_value = "10")]
    quantity: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    let socket_addr: SocketAddr = format!("{}:{}", args.address, args.port).parse()?;
    println!("Connecting to Modbus server at {}", socket_addr);

    let mut ctx = tcp::connect_slave(socket_addr, Slave(args.slave)).await?;

    println!(
        "Reading {} {:?} registers starting at address {}",
        args.quantity, args.bank, args.register
    );
    let request = async {
        match args.bank {
            Bank::Input => ctx.read_input_registers(args.register, args.quantity).await,
            Bank::Holding => ctx.read_holding_registers(args.register, args.quantity).await,
        }
    };
    let response = tokio::time::timeout(Duration::from_secs(1), request).await??;

    match response {
        Ok(words) => {
            println!("Raw register values: {:?}", words);
            for (register, word) in (args.register..).zip(&words) {
                println!("Register {}: {} ({:#06x})", register, word, word);
            }
        }
        Err(exception) => println!("Server answered with exception {:?}", exception),
    }

    ctx.disconnect().await?;
    Ok(())
}
