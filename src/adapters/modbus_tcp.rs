//! Modbus/TCP client adapter (blocking `tokio-modbus` sync client).
//!
//! Each poller thread owns one [`TcpConnector`] and at most one open
//! [`TcpLink`].  Unit id 1, function code 3 only.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use tokio_modbus::Slave;
use tokio_modbus::client::sync::{self, Reader};

use crate::app::ports::{LinkConnector, RegisterLink};
use crate::error::LinkError;

/// Detector unit id.
pub const UNIT_ID: u8 = 1;

/// Opens sync Modbus/TCP sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

/// One open session.  Dropping it closes the socket.
pub struct TcpLink {
    ctx: sync::Context,
}

impl LinkConnector for TcpConnector {
    type Link = TcpLink;

    fn connect(
        &mut self,
        host: &str,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<TcpLink, LinkError> {
        let addr = resolve(host, port)?;
        let mut ctx = sync::tcp::connect_slave_with_timeout(addr, Slave(UNIT_ID), Some(connect_timeout))
            .map_err(|e| io_to_link(&e))?;
        ctx.set_timeout(read_timeout);
        Ok(TcpLink { ctx })
    }
}

impl RegisterLink for TcpLink {
    fn read_holding(&mut self, addr: u16, count: u16) -> Result<Vec<u16>, LinkError> {
        let regs = self
            .ctx
            .read_holding_registers(addr, count)
            .map_err(|e| LinkError::Read(e.to_string()))?
            .map_err(|code| LinkError::Exception(format!("{code:?}")))?;
        if regs.len() < usize::from(count) {
            return Err(LinkError::ShortResponse {
                expected: count,
                got: regs.len(),
            });
        }
        Ok(regs)
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, LinkError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| LinkError::Connect(format!("{host}: {e}")))?
        .next()
        .ok_or_else(|| LinkError::Connect(format!("{host}: no address")))
}

fn io_to_link(e: &io::Error) -> LinkError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => LinkError::Timeout,
        _ => LinkError::Connect(e.to_string()),
    }
}
