// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP server front end of the gateway
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The gateway is a server for TCP clients
//! and a client of the serial device.
//!
//! ## Function codes
//!
//! | Code | Request | Bank |
//! |------|---------|------|
//! | 0x03 | Read Holding Registers | holding |
//! | 0x04 | Read Input Registers | input |
//! | 0x06 | Write Single Register | holding |
//! | 0x10 | Write Multiple Registers | holding |
//!
//! Every other function code is answered with `IllegalFunction`. A request is
//! checked with [`RegisterDatastore::validate_range`] before it is served; a span
//! that cannot be served is answered with `IllegalDataAddress` without touching
//! the device.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio_modbus::prelude::*;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use super::datastore::RegisterDatastore;

/// Modbus service routing requests to the two register banks
///
/// Cloning is cheap: every TCP connection gets a clone sharing the same banks.
#[derive(Debug, Clone)]
pub struct GatewayService {
    input: Arc<RegisterDatastore>,
    holding: Arc<RegisterDatastore>,
}

impl GatewayService {
    pub fn new(input: Arc<RegisterDatastore>, holding: Arc<RegisterDatastore>) -> Self {
        Self { input, holding }
    }

    pub fn input(&self) -> &Arc<RegisterDatastore> {
        &self.input
    }

    pub fn holding(&self) -> &Arc<RegisterDatastore> {
        &self.holding
    }
}

async fn read_bank(
    bank: &RegisterDatastore,
    address: u16,
    count: u16,
) -> Result<Vec<u16>, ExceptionCode> {
    if !bank.validate_range(address, count) {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    bank.read(address, count).await.map_err(|err| {
        error!("Reading {} {} registers at {} failed: {}", count, bank.bank(), address, err);
        err.exception_code()
    })
}

async fn write_bank(
    bank: &RegisterDatastore,
    address: u16,
    values: &[u16],
) -> Result<(), ExceptionCode> {
    let count = u16::try_from(values.len()).map_err(|_| ExceptionCode::IllegalDataValue)?;
    if !bank.validate_range(address, count) {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    let result = if let [value] = values {
        bank.write(address, *value).await
    } else {
        bank.write_many(address, values).await
    };
    result.map_err(|err| {
        error!("Writing {} {} registers at {} failed: {}", count, bank.bank(), address, err);
        err.exception_code()
    })
}

impl tokio_modbus::server::Service for GatewayService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Received Modbus request: {:?}", req);
        let service = self.clone();

        async move {
            let res = match req {
                Request::ReadInputRegisters(addr, cnt) => read_bank(&service.input, addr, cnt)
                    .await
                    .map(Response::ReadInputRegisters),
                Request::ReadHoldingRegisters(addr, cnt) => {
                    read_bank(&service.holding, addr, cnt)
                        .await
                        .map(Response::ReadHoldingRegisters)
                }
                Request::WriteSingleRegister(addr, value) => {
                    write_bank(&service.holding, addr, std::slice::from_ref(&value))
                        .await
                        .map(|_| Response::WriteSingleRegister(addr, value))
                }
                Request::WriteMultipleRegisters(addr, values) => {
                    write_bank(&service.holding, addr, &values)
                        .await
                        .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16))
                }
                _ => {
                    error!(
                        "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                    );
                    Err(ExceptionCode::IllegalFunction)
                }
            };

            if let Err(e) = &res {
                debug!("Modbus request answered with exception {:?}", e);
            }
            res
        }
        .boxed()
    }
}

/// Serve Modbus TCP clients on `listener` until the future is dropped
///
/// Every accepted connection is handled by a clone of `service`.
pub async fn run_gateway_server(listener: TcpListener, service: GatewayService) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Modbus gateway listening on {}", addr);
    }
    let server = Server::new(listener);

    let on_connected = move |stream, socket_addr: SocketAddr| {
        let service = service.clone();
        async move {
            debug!("Modbus client connected from {}", socket_addr);
            accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                Ok(Some(service.clone()))
            })
        }
    };

    let on_process_error = |err| {
        error!("Modbus server error: {err}");
    };

    server.serve(&on_connected, on_process_error).await
}
