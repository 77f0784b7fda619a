use std::sync::Arc;

use rnsnow_frame::{
    classify, frame, FrameError, Fragmenter, HdlcDecoder, Inbound, Reassembler, PING, PROBE_ACK,
};
use rnsnow_transport::{PeerAddress, RadioTransport, SerialPort, BROADCAST};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::feedback::{BlinkPattern, Feedback, NoFeedback};
use crate::handle::{next_or_pending, BridgeControls, Tune};
use crate::scanner::{ChannelScanner, ScanOutcome};
use crate::watchdog::{NoopWatchdog, Watchdog};

/// Pumps Reticulum traffic between a serial link and a radio.
///
/// Serial bytes are decoded into link frames, re-framed, fragmented to the
/// radio MTU and sent to the configured peer. Radio payloads are classified:
/// control traffic is handled locally, complete link frames go to serial
/// as-is, and everything else is reassembled first.
///
/// Each pump owns its own codec state. Both share the radio; only the
/// radio-to-serial pump ever receives from it.
pub struct Bridge<R, S> {
    config: BridgeConfig,
    radio: R,
    serial: S,
    watchdog: Arc<dyn Watchdog>,
    feedback: Arc<dyn Feedback>,
}

impl<R, S> Bridge<R, S>
where
    R: RadioTransport,
    S: SerialPort,
{
    /// Validate `config` against itself and against what `radio` can carry.
    pub fn new(config: BridgeConfig, radio: R, serial: S) -> Result<Self> {
        config.validate()?;
        if config.radio_mtu > radio.mtu() {
            return Err(BridgeError::Config(format!(
                "radio_mtu {} exceeds the radio's limit of {}",
                config.radio_mtu,
                radio.mtu()
            )));
        }
        Ok(Self {
            config,
            radio,
            serial,
            watchdog: Arc::new(NoopWatchdog),
            feedback: Arc::new(NoFeedback),
        })
    }

    pub fn with_watchdog(mut self, watchdog: Arc<dyn Watchdog>) -> Self {
        self.watchdog = watchdog;
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn Feedback>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    /// Data destination.
    pub fn peer(&self) -> PeerAddress {
        self.config.mac
    }

    /// Register peers and tune the radio. Any failure here is fatal.
    pub fn init_radio(&self) -> Result<()> {
        self.radio.add_peer(BROADCAST).map_err(BridgeError::RadioInit)?;
        if !self.peer().is_broadcast() {
            self.radio
                .add_peer(self.peer())
                .map_err(BridgeError::RadioInit)?;
        }
        self.radio
            .set_channel(self.config.channel)
            .map_err(BridgeError::RadioInit)?;
        info!(
            channel = self.config.channel,
            peer = %self.peer(),
            protocol = ?self.config.protocol,
            "radio configured"
        );
        Ok(())
    }

    /// Run the channel scan now. Must not overlap a running radio-to-serial pump.
    pub async fn scan(&self) -> Result<ScanOutcome> {
        ChannelScanner::new(&self.radio, &self.config.scan)
            .with_watchdog(self.watchdog.as_ref())
            .scan(self.config.channel)
            .await
    }

    /// Bring the radio up, optionally scan, then pump until `shutdown`.
    ///
    /// Returns an error only for startup failures; per-message errors are
    /// logged and the pumps carry on.
    pub async fn run(&self, controls: BridgeControls, shutdown: CancellationToken) -> Result<()> {
        self.init_radio()?;
        let fragmenter = Fragmenter::new(self.config.fragment_config())?;

        if self.config.scan.enabled {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                scanned = self.scan() => {
                    if let Err(err) = scanned {
                        warn!(error = %err, "initial channel scan failed");
                    }
                }
            }
        }

        let BridgeControls { pings, tunes } = controls;
        info!(channel = self.radio.channel(), "bridge running");
        tokio::select! {
            () = shutdown.cancelled() => {}
            _ = async {
                tokio::join!(
                    self.serial_to_radio(fragmenter, Some(pings)),
                    self.radio_to_serial(Some(tunes)),
                )
            } => {}
        }
        info!("bridge stopped");
        Ok(())
    }

    /// Frame `payload`, fragment it and transmit every piece to the peer.
    ///
    /// Returns the number of radio sends. A payload needing more fragments
    /// than allowed is rejected before anything is sent.
    pub async fn send_frame(&self, fragmenter: &mut Fragmenter, payload: &[u8]) -> Result<usize> {
        let wire = frame(payload);
        let pieces = fragmenter.fragment(&wire)?;
        let delay = self.config.inter_fragment_delay();

        for piece in &pieces {
            self.radio.send(self.peer(), piece).await?;
            tokio::time::sleep(delay).await;
        }

        debug!(len = payload.len(), fragments = pieces.len(), "frame sent");
        self.feedback.blink(BlinkPattern::SEND);
        Ok(pieces.len())
    }

    /// Broadcast a presence ping.
    pub async fn send_ping(&self) -> Result<()> {
        info!(channel = self.radio.channel(), "sending ping");
        self.radio.send(BROADCAST, PING).await?;
        self.feedback.blink(BlinkPattern::PING);
        Ok(())
    }

    async fn serial_to_radio(
        &self,
        mut fragmenter: Fragmenter,
        mut pings: Option<mpsc::Receiver<()>>,
    ) {
        let mut decoder = HdlcDecoder::with_max_frame_size(self.config.max_frame_size);
        let idle = self.config.idle_poll();
        info!("serial to radio pump started");

        loop {
            self.watchdog.feed();

            if self.serial.is_open() {
                match self.serial.read() {
                    Ok(Some(chunk)) => {
                        trace!(len = chunk.len(), "serial read");
                        for payload in decoder.decode(&chunk) {
                            self.forward_to_radio(&mut fragmenter, &payload).await;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(error = %err, "serial read failed");
                        decoder.reset();
                    }
                }
            }

            tokio::select! {
                () = next_or_pending(&mut pings) => {
                    if let Err(err) = self.send_ping().await {
                        warn!(error = %err, "ping failed");
                    }
                }
                () = tokio::time::sleep(idle) => {}
            }
        }
    }

    async fn forward_to_radio(&self, fragmenter: &mut Fragmenter, payload: &[u8]) {
        match self.send_frame(fragmenter, payload).await {
            Ok(_) => {}
            Err(BridgeError::Frame(err @ FrameError::TooManyFragments { .. })) => {
                error!(len = payload.len(), error = %err, "frame rejected");
            }
            Err(err) => warn!(len = payload.len(), error = %err, "send failed"),
        }
    }

    async fn radio_to_serial(&self, mut tunes: Option<mpsc::Receiver<Tune>>) {
        let mut reassembler = Reassembler::new(self.config.reassembly_config());
        let idle = self.config.idle_poll();
        let poll = self.config.recv_poll();
        info!("radio to serial pump started");

        loop {
            self.watchdog.feed();

            if !self.serial.is_open() {
                match self.serial.open() {
                    Ok(()) => info!(baud = self.config.baudrate, "serial initialised"),
                    Err(err) => {
                        warn!(error = %err, "serial initialisation failed, retrying");
                        tokio::time::sleep(idle).await;
                        continue;
                    }
                }
            }

            tokio::select! {
                tune = next_or_pending(&mut tunes) => self.retune(tune).await,
                received = tokio::time::timeout(poll, self.radio.recv()) => match received {
                    Ok(Ok((from, data))) => self.handle_inbound(&mut reassembler, from, &data).await,
                    Ok(Err(err)) => {
                        warn!(error = %err, "radio receive failed");
                        tokio::time::sleep(idle).await;
                    }
                    Err(_) => {
                        reassembler.expire(std::time::Instant::now());
                    }
                },
            }
        }
    }

    async fn handle_inbound(&self, reassembler: &mut Reassembler, from: PeerAddress, data: &[u8]) {
        match classify(data) {
            Inbound::Empty => {}
            Inbound::Ping => {
                info!(peer = %from, "ping received");
                self.feedback.blink(BlinkPattern::PING);
            }
            Inbound::Probe => match self.radio.send(BROADCAST, PROBE_ACK).await {
                Ok(()) => info!(peer = %from, "probe answered"),
                Err(err) => warn!(peer = %from, error = %err, "probe answer failed"),
            },
            Inbound::ProbeAck => trace!(peer = %from, "stray probe acknowledgement"),
            Inbound::Frame(wire) => self.write_serial(wire, "frame forwarded"),
            Inbound::Fragment(raw) => {
                if let Some(message) = reassembler.accept(from, raw) {
                    self.write_serial(&message, "reassembled frame forwarded");
                }
            }
        }
    }

    fn write_serial(&self, data: &[u8], what: &'static str) {
        match self.serial.write(data) {
            Ok(()) => debug!(len = data.len(), "{what}"),
            Err(err) => warn!(len = data.len(), error = %err, "serial write failed"),
        }
    }

    async fn retune(&self, tune: Tune) {
        match tune {
            Tune::Rescan => match self.scan().await {
                Ok(outcome) => info!(channel = outcome.best, "rescan complete"),
                Err(err) => warn!(error = %err, "rescan failed"),
            },
            Tune::SetChannel(channel) => match self.radio.set_channel(channel) {
                Ok(()) => info!(channel, "channel changed"),
                Err(err) => warn!(channel, error = %err, "channel change failed"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use rnsnow_frame::{HEADER_SIZE, PROBE};
    use rnsnow_transport::{MemoryMedium, MemoryRadio, MemorySerial, SerialHost, TransportError};

    use super::*;

    const LOCAL: PeerAddress = PeerAddress::new([0x01; 6]);
    const REMOTE: PeerAddress = PeerAddress::new([0x02; 6]);

    #[derive(Default)]
    struct RecordingFeedback(Mutex<Vec<BlinkPattern>>);

    impl Feedback for RecordingFeedback {
        fn blink(&self, pattern: BlinkPattern) {
            self.0.lock().unwrap().push(pattern);
        }
    }

    fn config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.scan.enabled = false;
        config
    }

    fn bridge(medium: &MemoryMedium) -> (Bridge<MemoryRadio, MemorySerial>, SerialHost) {
        let (serial, host) = MemorySerial::pair();
        let radio = medium.attach(LOCAL, 6);
        (Bridge::new(config(), radio, serial).unwrap(), host)
    }

    #[test]
    fn invalid_config_is_refused() {
        let medium = MemoryMedium::new();
        let (serial, _host) = MemorySerial::pair();
        let mut config = config();
        config.channel = 0;
        let result = Bridge::new(config, medium.attach(LOCAL, 6), serial);
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn mtu_beyond_radio_limit_is_refused() {
        let medium = MemoryMedium::new();
        let (serial, _host) = MemorySerial::pair();
        let mut config = config();
        config.radio_mtu = 400;
        let result = Bridge::new(config, medium.attach(LOCAL, 6), serial);
        assert!(matches!(result, Err(BridgeError::Config(msg)) if msg.contains("400")));
    }

    #[tokio::test(start_paused = true)]
    async fn smaller_mtu_keeps_every_send_in_bounds() {
        let medium = MemoryMedium::new();
        let (serial, _host) = MemorySerial::pair();
        let mut config = config();
        config.radio_mtu = 120;
        let bridge = Bridge::new(config, medium.attach(LOCAL, 6), serial).unwrap();
        bridge.init_radio().unwrap();
        let mut fragmenter = Fragmenter::new(bridge.config().fragment_config()).unwrap();

        bridge.send_frame(&mut fragmenter, &[0x33; 300]).await.unwrap();
        let sent = medium.transmissions_from(LOCAL);
        assert!(sent.len() > 1);
        assert!(sent.iter().all(|t| t.payload.len() <= 120));
    }

    #[tokio::test(start_paused = true)]
    async fn send_frame_fragments_large_payload() {
        let medium = MemoryMedium::new();
        let (bridge, _host) = bridge(&medium);
        bridge.init_radio().unwrap();
        let mut fragmenter = Fragmenter::new(bridge.config().fragment_config()).unwrap();

        let payload = vec![0x11u8; 600];
        let sent = bridge.send_frame(&mut fragmenter, &payload).await.unwrap();
        assert_eq!(sent, 3);

        let sizes: Vec<usize> = medium
            .transmissions_from(LOCAL)
            .iter()
            .map(|t| t.payload.len() - HEADER_SIZE)
            .collect();
        // 600 bytes framed with two markers and no escapes.
        assert_eq!(sizes, vec![236, 236, 130]);
    }

    #[tokio::test(start_paused = true)]
    async fn send_frame_small_payload_goes_out_framed() {
        let medium = MemoryMedium::new();
        let feedback = Arc::new(RecordingFeedback::default());
        let (bridge, _host) = bridge(&medium);
        let bridge = bridge.with_feedback(feedback.clone());
        bridge.init_radio().unwrap();
        let mut fragmenter = Fragmenter::new(bridge.config().fragment_config()).unwrap();

        bridge.send_frame(&mut fragmenter, b"hello").await.unwrap();
        let sent = medium.transmissions_from(LOCAL);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload.as_ref(), b"\x7ehello\x7e");
        assert!(sent[0].to.is_broadcast());
        assert_eq!(*feedback.0.lock().unwrap(), vec![BlinkPattern::SEND]);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_frame_is_not_sent() {
        let medium = MemoryMedium::new();
        let (bridge, _host) = bridge(&medium);
        bridge.init_radio().unwrap();
        let mut fragmenter = Fragmenter::new(bridge.config().fragment_config()).unwrap();

        let err = bridge
            .send_frame(&mut fragmenter, &vec![0u8; 16 * 236])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Frame(FrameError::TooManyFragments { .. })
        ));
        assert!(medium.transmissions_from(LOCAL).is_empty());
    }

    #[tokio::test]
    async fn unicast_peer_is_registered() {
        let medium = MemoryMedium::new();
        let (serial, _host) = MemorySerial::pair();
        let mut config = config();
        config.mac = REMOTE;
        let bridge = Bridge::new(config, medium.attach(LOCAL, 1), serial).unwrap();
        bridge.init_radio().unwrap();
        assert_eq!(bridge.radio().channel(), 6);

        let mut fragmenter = Fragmenter::new(bridge.config().fragment_config()).unwrap();
        bridge.send_frame(&mut fragmenter, b"x").await.unwrap();
        assert_eq!(medium.transmissions_from(LOCAL)[0].to, REMOTE);
    }

    #[tokio::test]
    async fn inbound_control_traffic_is_not_forwarded() {
        let medium = MemoryMedium::new();
        let feedback = Arc::new(RecordingFeedback::default());
        let (bridge, host) = bridge(&medium);
        let bridge = bridge.with_feedback(feedback.clone());
        bridge.init_radio().unwrap();
        bridge.serial().open().unwrap();
        let mut reassembler = Reassembler::default();

        bridge.handle_inbound(&mut reassembler, REMOTE, PING).await;
        bridge.handle_inbound(&mut reassembler, REMOTE, PROBE).await;
        bridge.handle_inbound(&mut reassembler, REMOTE, PROBE_ACK).await;
        bridge.handle_inbound(&mut reassembler, REMOTE, b"").await;

        assert!(host.take_output().is_empty());
        assert_eq!(*feedback.0.lock().unwrap(), vec![BlinkPattern::PING]);
        let acks: Vec<_> = medium
            .transmissions_from(LOCAL)
            .into_iter()
            .filter(|t| t.payload.as_ref() == PROBE_ACK)
            .collect();
        assert_eq!(acks.len(), 1);
    }

    #[tokio::test]
    async fn inbound_frame_written_verbatim() {
        let medium = MemoryMedium::new();
        let (bridge, host) = bridge(&medium);
        bridge.serial().open().unwrap();
        let mut reassembler = Reassembler::default();

        let wire = frame(b"\x7dpayload\x7e");
        bridge.handle_inbound(&mut reassembler, REMOTE, &wire).await;
        assert_eq!(host.take_output(), wire);
    }

    #[tokio::test]
    async fn serial_write_failure_is_not_fatal() {
        let medium = MemoryMedium::new();
        let (bridge, host) = bridge(&medium);
        let mut reassembler = Reassembler::default();

        // Port never opened: the write fails and is only logged.
        bridge
            .handle_inbound(&mut reassembler, REMOTE, &frame(b"lost"))
            .await;
        assert!(host.take_output().is_empty());
        assert!(matches!(
            bridge.serial().write(b"x"),
            Err(TransportError::NotOpen)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let medium = MemoryMedium::new();
        let (bridge, _host) = bridge(&medium);
        let (_handle, controls) = crate::handle::control_channel(Duration::ZERO);
        let shutdown = CancellationToken::new();

        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stopper.cancel();
        });
        bridge.run(controls, shutdown).await.unwrap();
    }
}
