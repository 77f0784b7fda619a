//! ESP-NOW medium emulated over UDP.
//!
//! Every radio send becomes one datagram fanned out to a fixed neighbour list,
//! so a handful of bridges on a LAN (or one host) behave like stations within
//! range of each other.
//!
//! Datagram layout:
//! ```text
//! ┌─────────────┬──────────────┬──────────────┬───────────────────┐
//! │ Channel (1) │ Source (6B)  │ Dest (6B)    │ Radio payload     │
//! └─────────────┴──────────────┴──────────────┴───────────────────┘
//! ```
//! Receivers drop datagrams tuned to another channel or unicast to another
//! station, which is what a real radio does in hardware.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::address::PeerAddress;
use crate::error::{Result, TransportError};
use crate::traits::{check_channel, RadioProtocol, RadioTransport, ESPNOW_MTU};

/// Channel + source + destination.
pub const DATAGRAM_HEADER_SIZE: usize = 13;

const RECV_BUFFER_SIZE: usize = 2048;

/// Configuration for [`UdpRadio`].
#[derive(Debug, Clone)]
pub struct UdpRadioConfig {
    /// Local socket address to receive on.
    pub bind: SocketAddr,
    /// Stations within "range": every send goes to each of them.
    pub neighbors: Vec<SocketAddr>,
    /// This station's radio address.
    pub address: PeerAddress,
    /// Initial channel.
    pub channel: u8,
    /// PHY mode. Only recorded; UDP has a single rate.
    pub protocol: RadioProtocol,
}

/// A [`RadioTransport`] backed by a UDP socket.
#[derive(Debug)]
pub struct UdpRadio {
    socket: UdpSocket,
    neighbors: Vec<SocketAddr>,
    address: PeerAddress,
    channel: AtomicU8,
    peers: Mutex<HashSet<PeerAddress>>,
}

impl UdpRadio {
    /// Bind the local socket and tune to the configured channel.
    pub async fn bind(config: UdpRadioConfig) -> Result<Self> {
        let channel = check_channel(config.channel)?;
        let socket = UdpSocket::bind(config.bind)
            .await
            .map_err(|source| TransportError::Bind {
                addr: config.bind,
                source,
            })?;

        info!(
            bind = %config.bind,
            address = %config.address,
            neighbors = config.neighbors.len(),
            channel,
            protocol = ?config.protocol,
            "udp radio ready"
        );

        Ok(Self {
            socket,
            neighbors: config.neighbors,
            address: config.address,
            channel: AtomicU8::new(channel),
            peers: Mutex::new(HashSet::new()),
        })
    }

    /// The address the socket actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn address(&self) -> PeerAddress {
        self.address
    }

    fn knows_peer(&self, peer: &PeerAddress) -> bool {
        self.peers
            .lock()
            .map(|peers| peers.contains(peer))
            .unwrap_or(false)
    }
}

impl RadioTransport for UdpRadio {
    async fn send(&self, peer: PeerAddress, data: &[u8]) -> Result<()> {
        if data.len() > ESPNOW_MTU {
            return Err(TransportError::PayloadTooLarge {
                size: data.len(),
                max: ESPNOW_MTU,
            });
        }
        if !peer.is_broadcast() && !self.knows_peer(&peer) {
            return Err(TransportError::UnknownPeer(peer));
        }

        let datagram = encode_datagram(self.channel(), self.address, peer, data);
        let mut last_err = None;
        let mut delivered = 0usize;
        for neighbor in &self.neighbors {
            match self.socket.send_to(&datagram, neighbor).await {
                Ok(_) => delivered += 1,
                Err(err) => {
                    debug!(%neighbor, error = %err, "datagram not delivered");
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(err) if delivered == 0 => Err(TransportError::Io(err)),
            _ => Ok(()),
        }
    }

    async fn recv(&self) -> Result<(PeerAddress, Bytes)> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            let (n, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
                    ) =>
                {
                    continue
                }
                Err(err) => return Err(TransportError::Io(err)),
            };

            let Some((channel, src, dst, payload)) = decode_datagram(&buf[..n]) else {
                warn!(%from, len = n, "discarding malformed datagram");
                continue;
            };
            if channel != self.channel() || src == self.address {
                continue;
            }
            if !dst.is_broadcast() && dst != self.address {
                continue;
            }
            return Ok((src, Bytes::copy_from_slice(payload)));
        }
    }

    fn set_channel(&self, channel: u8) -> Result<()> {
        self.channel.store(check_channel(channel)?, Ordering::SeqCst);
        Ok(())
    }

    fn channel(&self) -> u8 {
        self.channel.load(Ordering::SeqCst)
    }

    fn add_peer(&self, peer: PeerAddress) -> Result<()> {
        self.peers
            .lock()
            .map_err(|_| TransportError::Io(std::io::Error::other("peer table poisoned")))?
            .insert(peer);
        Ok(())
    }
}

fn encode_datagram(channel: u8, src: PeerAddress, dst: PeerAddress, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(DATAGRAM_HEADER_SIZE + payload.len());
    buf.put_u8(channel);
    buf.put_slice(src.as_bytes());
    buf.put_slice(dst.as_bytes());
    buf.put_slice(payload);
    buf
}

fn decode_datagram(buf: &[u8]) -> Option<(u8, PeerAddress, PeerAddress, &[u8])> {
    if buf.len() < DATAGRAM_HEADER_SIZE {
        return None;
    }
    let src = PeerAddress::from_slice(&buf[1..7])?;
    let dst = PeerAddress::from_slice(&buf[7..13])?;
    Some((buf[0], src, dst, &buf[DATAGRAM_HEADER_SIZE..]))
}
