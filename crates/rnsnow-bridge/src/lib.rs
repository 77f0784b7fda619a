//! Reticulum serial to ESP-NOW bridge.
//!
//! [`Bridge`] owns a [`RadioTransport`](rnsnow_transport::RadioTransport) and
//! a [`SerialPort`](rnsnow_transport::SerialPort) and runs two cooperative
//! pumps between them. [`ChannelScanner`] finds the channel peers are using.
//! Everything is configured through an explicit [`BridgeConfig`].

pub mod bridge;
pub mod config;
pub mod error;
pub mod feedback;
pub mod handle;
pub mod scanner;
pub mod watchdog;

pub use bridge::Bridge;
pub use config::{BridgeConfig, LogLevel, ScanConfig, MAX_DESCRIPTION_LEN};
pub use error::{BridgeError, Result};
pub use feedback::{BlinkPattern, Feedback, LogFeedback, NoFeedback};
pub use handle::{control_channel, BridgeControls, BridgeHandle, Tune};
pub use scanner::{candidate_channels, select_best, ChannelResult, ChannelScanner, ScanOutcome};
pub use watchdog::{NoopWatchdog, SoftWatchdog, Watchdog};
