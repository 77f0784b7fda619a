//! In-process radio medium and serial link.
//!
//! Used by tests and simulations: several [`MemoryRadio`] stations attached to
//! one [`MemoryMedium`] hear each other's transmissions when tuned to the same
//! channel, and every transmission is recorded for inspection.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use crate::address::PeerAddress;
use crate::error::{Result, TransportError};
use crate::traits::{check_channel, RadioTransport, SerialPort, ESPNOW_MTU};

type Delivery = (PeerAddress, Bytes);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One recorded radio transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub from: PeerAddress,
    pub to: PeerAddress,
    pub channel: u8,
    pub payload: Bytes,
}

struct Station {
    addr: PeerAddress,
    channel: Arc<AtomicU8>,
    tx: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct MediumState {
    stations: Vec<Station>,
    log: Vec<Transmission>,
}

impl MediumState {
    fn deliver(&mut self, transmission: Transmission) {
        for station in &self.stations {
            if station.addr == transmission.from
                || station.channel.load(Ordering::SeqCst) != transmission.channel
            {
                continue;
            }
            if transmission.to.is_broadcast() || transmission.to == station.addr {
                let _ = station
                    .tx
                    .send((transmission.from, transmission.payload.clone()));
            }
        }
        self.log.push(transmission);
    }
}

/// A shared, lossless, in-order broadcast medium.
#[derive(Clone, Default)]
pub struct MemoryMedium {
    state: Arc<Mutex<MediumState>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new station tuned to `channel`.
    pub fn attach(&self, addr: PeerAddress, channel: u8) -> MemoryRadio {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(AtomicU8::new(channel));
        lock(&self.state).stations.push(Station {
            addr,
            channel: Arc::clone(&channel),
            tx,
        });

        MemoryRadio {
            addr,
            channel,
            rx: tokio::sync::Mutex::new(rx),
            peers: Mutex::new(HashSet::new()),
            medium: self.clone(),
        }
    }

    /// Put a broadcast on the air from a station that is not attached.
    pub fn inject(&self, from: PeerAddress, channel: u8, payload: impl Into<Bytes>) {
        lock(&self.state).deliver(Transmission {
            from,
            to: crate::address::BROADCAST,
            channel,
            payload: payload.into(),
        });
    }

    /// Every transmission made so far, in order.
    pub fn transmissions(&self) -> Vec<Transmission> {
        lock(&self.state).log.clone()
    }

    /// Transmissions made by one station.
    pub fn transmissions_from(&self, addr: PeerAddress) -> Vec<Transmission> {
        lock(&self.state)
            .log
            .iter()
            .filter(|t| t.from == addr)
            .cloned()
            .collect()
    }
}

/// A station on a [`MemoryMedium`].
pub struct MemoryRadio {
    addr: PeerAddress,
    channel: Arc<AtomicU8>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>,
    peers: Mutex<HashSet<PeerAddress>>,
    medium: MemoryMedium,
}

impl MemoryRadio {
    pub fn address(&self) -> PeerAddress {
        self.addr
    }
}

impl RadioTransport for MemoryRadio {
    async fn send(&self, peer: PeerAddress, data: &[u8]) -> Result<()> {
        if data.len() > ESPNOW_MTU {
            return Err(TransportError::PayloadTooLarge {
                size: data.len(),
                max: ESPNOW_MTU,
            });
        }
        if !peer.is_broadcast() && !lock(&self.peers).contains(&peer) {
            return Err(TransportError::UnknownPeer(peer));
        }

        lock(&self.medium.state).deliver(Transmission {
            from: self.addr,
            to: peer,
            channel: self.channel(),
            payload: Bytes::copy_from_slice(data),
        });
        Ok(())
    }

    async fn recv(&self) -> Result<(PeerAddress, Bytes)> {
        self.rx.lock().await.recv().await.ok_or(TransportError::Closed)
    }

    fn set_channel(&self, channel: u8) -> Result<()> {
        self.channel.store(check_channel(channel)?, Ordering::SeqCst);
        Ok(())
    }

    fn channel(&self) -> u8 {
        self.channel.load(Ordering::SeqCst)
    }

    fn add_peer(&self, peer: PeerAddress) -> Result<()> {
        lock(&self.peers).insert(peer);
        Ok(())
    }
}

#[derive(Default)]
struct SerialState {
    open: bool,
    failing_opens: usize,
    open_attempts: usize,
    inbound: BytesMut,
    outbound: BytesMut,
}

/// Device side of an in-memory serial link.
pub struct MemorySerial {
    state: Arc<Mutex<SerialState>>,
}

/// Host side of an in-memory serial link: feeds input and collects output.
#[derive(Clone)]
pub struct SerialHost {
    state: Arc<Mutex<SerialState>>,
}

impl MemorySerial {
    pub fn pair() -> (MemorySerial, SerialHost) {
        Self::with_failing_opens(0)
    }

    /// A link whose first `failures` calls to [`SerialPort::open`] fail.
    pub fn with_failing_opens(failures: usize) -> (MemorySerial, SerialHost) {
        let state = Arc::new(Mutex::new(SerialState {
            failing_opens: failures,
            ..SerialState::default()
        }));
        (
            MemorySerial {
                state: Arc::clone(&state),
            },
            SerialHost { state },
        )
    }
}

impl SerialPort for MemorySerial {
    fn open(&self) -> Result<()> {
        let mut state = lock(&self.state);
        state.open_attempts += 1;
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(TransportError::Io(std::io::Error::other(
                "simulated open failure",
            )));
        }
        state.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    fn read(&self) -> Result<Option<Bytes>> {
        let mut state = lock(&self.state);
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        if state.inbound.is_empty() {
            return Ok(None);
        }
        Ok(Some(state.inbound.split().freeze()))
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        state.outbound.extend_from_slice(data);
        Ok(())
    }
}

impl SerialHost {
    /// Queue bytes for the device to read.
    pub fn push(&self, data: &[u8]) {
        lock(&self.state).inbound.extend_from_slice(data);
    }

    /// Drain everything the device has written so far.
    pub fn take_output(&self) -> Bytes {
        lock(&self.state).outbound.split().freeze()
    }

    pub fn open_attempts(&self) -> usize {
        lock(&self.state).open_attempts
    }

    /// Simulate the link dropping; the device must re-open it.
    pub fn disconnect(&self) {
        lock(&self.state).open = false;
    }
}
