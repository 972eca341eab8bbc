// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Frequency-set datagrams from contest loggers.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use rigbridge_core::{DynResult, RadioAdapter, RigSelector, Vfo};
use rigbridge_protocol::{parse_datagram, LoggerCommand};

const MAX_DATAGRAM: usize = 65_535;

pub async fn bind(port: u16) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
    info!("Listening for logger datagrams on {}", socket.local_addr()?);
    Ok(socket)
}

async fn handle_datagram(adapter: &RadioAdapter, datagram: &[u8], peer: SocketAddr) -> DynResult<()> {
    match parse_datagram(datagram)? {
        Some(LoggerCommand::SetFrequency { hz }) => {
            adapter.set_frequency(RigSelector::Rig1, Vfo::A, hz).await?;
            info!("Set radio frequency to {} Hz (from {})", hz, peer);
        }
        None => debug!("Ignoring datagram from {}", peer),
    }
    Ok(())
}

/// Receive until shutdown. Bad datagrams and radio errors are logged and
/// the loop goes on.
pub async fn run(socket: UdpSocket, adapter: RadioAdapter, mut shutdown: watch::Receiver<bool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => {
                    if let Err(e) = handle_datagram(&adapter, &buf[..len], peer).await {
                        warn!(
                            "Error processing datagram from {}: {} ({})",
                            peer,
                            e,
                            String::from_utf8_lossy(&buf[..len])
                        );
                    }
                }
                Err(e) => error!("Error receiving UDP message: {}", e),
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("Logger datagram receiver stopped");
}
