//! Channel discovery.
//!
//! The scanner tunes through a prioritized channel list, broadcasts a probe
//! on each channel and counts the acknowledgements that come back. The
//! channel with the most responders wins; ties go to the channel scanned
//! first, and a scan that hears nobody falls back to the default channel.

use rnsnow_frame::{classify, Inbound, PROBE, PROBE_ACK};
use rnsnow_transport::{RadioTransport, BROADCAST, MIN_CHANNEL};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::error::Result;
use crate::watchdog::{NoopWatchdog, Watchdog};

/// Responses heard on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelResult {
    pub channel: u8,
    pub responses: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    /// Channel the radio was left on.
    pub best: u8,
    /// Responses counted on `best` (zero when falling back to the default).
    pub responses: u32,
    /// Per-channel counts in scan order.
    pub results: Vec<ChannelResult>,
}

impl ScanOutcome {
    pub fn found_peers(&self) -> bool {
        self.responses > 0
    }
}

/// Preferred channels first (deduplicated), then every other channel up to `max_channel`.
pub fn candidate_channels(preferred: &[u8], max_channel: u8) -> Vec<u8> {
    let legal = MIN_CHANNEL..=max_channel;
    let mut channels: Vec<u8> = Vec::with_capacity(max_channel as usize);
    for ch in preferred.iter().copied().chain(legal.clone()) {
        if legal.contains(&ch) && !channels.contains(&ch) {
            channels.push(ch);
        }
    }
    channels
}

/// Pick the channel with the strictly highest count, earliest on ties.
///
/// Returns `(default, 0)` when nobody answered anywhere.
pub fn select_best(results: &[ChannelResult], default: u8) -> (u8, u32) {
    results.iter().fold((default, 0), |(best, max), result| {
        if result.responses > max {
            (result.channel, result.responses)
        } else {
            (best, max)
        }
    })
}

/// Runs one scan against a radio.
///
/// The scanner reads from the radio directly, so nothing else may be
/// receiving while it runs. Traffic other than acknowledgements that arrives
/// during the scan is dropped; probes from other scanners are still answered.
pub struct ChannelScanner<'a, R> {
    radio: &'a R,
    config: &'a ScanConfig,
    watchdog: &'a dyn Watchdog,
}

impl<'a, R: RadioTransport> ChannelScanner<'a, R> {
    pub fn new(radio: &'a R, config: &'a ScanConfig) -> Self {
        Self {
            radio,
            config,
            watchdog: &NoopWatchdog,
        }
    }

    /// Feed `watchdog` while scanning; a full scan outlasts most timeouts.
    pub fn with_watchdog(mut self, watchdog: &'a dyn Watchdog) -> Self {
        self.watchdog = watchdog;
        self
    }

    /// Scan every candidate and leave the radio on the winner.
    pub async fn scan(&self, default_channel: u8) -> Result<ScanOutcome> {
        let channels = candidate_channels(&self.config.preferred_channels, self.config.max_channel);
        info!(channels = channels.len(), "starting channel scan");

        let mut results = Vec::with_capacity(channels.len());
        for channel in channels {
            let responses = match self.radio.set_channel(channel) {
                Ok(()) => self.probe_channel(channel).await,
                Err(err) => {
                    warn!(channel, error = %err, "cannot tune, skipping channel");
                    0
                }
            };
            results.push(ChannelResult { channel, responses });
        }

        let (best, responses) = select_best(&results, default_channel);
        self.radio.set_channel(best)?;
        if responses > 0 {
            info!(channel = best, responses, "peers found");
        } else {
            info!(channel = best, "no peers found, using default channel");
        }

        Ok(ScanOutcome {
            best,
            responses,
            results,
        })
    }

    async fn probe_channel(&self, channel: u8) -> u32 {
        debug!(channel, "scanning channel");
        let mut responses = 0;

        for _ in 0..self.config.attempts {
            self.watchdog.feed();
            if let Err(err) = self.radio.send(BROADCAST, PROBE).await {
                warn!(channel, error = %err, "probe send failed");
            }

            let deadline = Instant::now() + self.config.listen_window();
            loop {
                let received = match tokio::time::timeout_at(deadline, self.radio.recv()).await {
                    Ok(received) => received,
                    Err(_) => break,
                };
                match received {
                    Ok((from, data)) => match classify(&data) {
                        Inbound::ProbeAck => {
                            responses += 1;
                            debug!(channel, peer = %from, "probe acknowledged");
                        }
                        Inbound::Probe => {
                            if let Err(err) = self.radio.send(BROADCAST, PROBE_ACK).await {
                                debug!(error = %err, "probe answer failed");
                            }
                        }
                        _ => {}
                    },
                    Err(err) => {
                        debug!(channel, error = %err, "receive failed during scan");
                        break;
                    }
                }
            }

            tokio::time::sleep(self.config.attempt_gap()).await;
        }

        responses
    }
}
