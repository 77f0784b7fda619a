//! Out-of-band requests to a running bridge: presence ping, rescan, retune.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rnsnow_transport::{MAX_CHANNEL, MIN_CHANNEL};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{BridgeError, Result};

const TUNE_QUEUE_DEPTH: usize = 4;

/// A radio re-tuning request, served by the radio-to-serial pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tune {
    /// Run the channel scan again.
    Rescan,
    /// Switch to a specific channel.
    SetChannel(u8),
}

/// Cloneable trigger for a running bridge.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    ping_tx: mpsc::Sender<()>,
    tune_tx: mpsc::Sender<Tune>,
    cooldown: Duration,
    last_ping: Arc<Mutex<Option<Instant>>>,
}

/// Receiving half of [`control_channel`], consumed by `Bridge::run`.
#[derive(Debug)]
pub struct BridgeControls {
    pub(crate) pings: mpsc::Receiver<()>,
    pub(crate) tunes: mpsc::Receiver<Tune>,
}

/// Create a linked handle/controls pair. Pings closer together than
/// `cooldown` are ignored, like a debounced button.
pub fn control_channel(cooldown: Duration) -> (BridgeHandle, BridgeControls) {
    let (ping_tx, pings) = mpsc::channel(1);
    let (tune_tx, tunes) = mpsc::channel(TUNE_QUEUE_DEPTH);
    (
        BridgeHandle {
            ping_tx,
            tune_tx,
            cooldown,
            last_ping: Arc::new(Mutex::new(None)),
        },
        BridgeControls { pings, tunes },
    )
}

impl BridgeHandle {
    /// Request a presence ping. Returns false when debounced or the bridge is gone.
    pub fn ping(&self) -> bool {
        let now = Instant::now();
        let mut last = self
            .last_ping
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if last.is_some_and(|at| now.duration_since(at) <= self.cooldown) {
            debug!("ping debounced");
            return false;
        }
        if self.ping_tx.try_send(()).is_err() {
            return false;
        }
        *last = Some(now);
        true
    }

    /// Request a fresh channel scan.
    pub fn rescan(&self) -> bool {
        self.tune_tx.try_send(Tune::Rescan).is_ok()
    }

    /// Request a switch to `channel`.
    pub fn set_channel(&self, channel: u8) -> Result<bool> {
        if !(MIN_CHANNEL..=MAX_CHANNEL).contains(&channel) {
            return Err(BridgeError::Config(format!(
                "channel {channel} outside {MIN_CHANNEL}..={MAX_CHANNEL}"
            )));
        }
        Ok(self.tune_tx.try_send(Tune::SetChannel(channel)).is_ok())
    }
}

/// Next message from an optional receiver; pends forever once it closes.
pub(crate) async fn next_or_pending<T>(rx: &mut Option<mpsc::Receiver<T>>) -> T {
    if let Some(inner) = rx.as_mut() {
        if let Some(value) = inner.recv().await {
            return value;
        }
        *rx = None;
    }
    std::future::pending().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ping_is_debounced() {
        let (handle, mut controls) = control_channel(Duration::from_millis(1000));

        assert!(handle.ping());
        assert!(controls.pings.try_recv().is_ok());

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!handle.ping());

        tokio::time::advance(Duration::from_millis(501)).await;
        assert!(handle.ping());
        assert!(controls.pings.try_recv().is_ok());
    }

    #[tokio::test]
    async fn ping_fails_once_bridge_is_gone() {
        let (handle, controls) = control_channel(Duration::ZERO);
        drop(controls);
        assert!(!handle.ping());
        assert!(!handle.rescan());
    }

    #[tokio::test]
    async fn tune_requests_are_queued_in_order() {
        let (handle, mut controls) = control_channel(Duration::ZERO);
        assert!(handle.rescan());
        assert!(handle.set_channel(11).unwrap());
        assert!(handle.set_channel(0).is_err());

        assert_eq!(controls.tunes.recv().await, Some(Tune::Rescan));
        assert_eq!(controls.tunes.recv().await, Some(Tune::SetChannel(11)));
    }

    #[tokio::test]
    async fn closed_receiver_pends() {
        let (tx, rx) = mpsc::channel::<u8>(1);
        drop(tx);
        let mut rx = Some(rx);
        let next = tokio::time::timeout(Duration::from_millis(20), next_or_pending(&mut rx)).await;
        assert!(next.is_err());
        assert!(rx.is_none());
    }
}
