//! Rust library for controlling LG networked soundbars
//!
//! This library provides an async API for LG soundbars that speak the encrypted
//! JSON protocol on TCP port 9741. It supports:
//!
//! - Power, volume and mute control
//! - Source (input function) and sound mode (equalizer) selection
//! - Feature toggles such as night mode or auto volume
//! - Now-playing metadata
//! - Change-tracked state with event subscriptions
//! - Automatic polling that backs off while the device stays off
//!
//! # Quick Start
//!
//! ```no_run
//! use lgsoundbar::{DeviceConfig, DeviceEvent, Soundbar};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DeviceConfig::new("living", "Living room", "192.168.1.40");
//!     let soundbar = Soundbar::new(config)?;
//!
//!     let mut events = soundbar.subscribe();
//!     soundbar.connect().await?;
//!
//!     if soundbar.select_source("Optical").await.is_ok() {
//!         println!("Source is now {:?}", soundbar.source());
//!     }
//!
//!     while let Ok(event) = events.recv().await {
//!         if let DeviceEvent::Update { changes, .. } = event {
//!             println!("Changed: {:?}", changes);
//!             break;
//!         }
//!     }
//!
//!     soundbar.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Wire Format
//!
//! Every message is one frame: a `0x10` marker, a big-endian `u32` payload
//! length and the payload, which is AES-256-CBC encrypted, PKCS#7 padded JSON.
//!
//! ```
//! use lgsoundbar::{codec, Command, MessageKind};
//!
//! let frame = codec::encode(&Command::get(MessageKind::SpeakerInfo)).unwrap();
//! assert_eq!(frame[0], 0x10);
//! assert_eq!((frame.len() - 5) % 16, 0);
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Client**: the [`Soundbar`] facade, command execution and subscriptions
//! - **Poller / Supervisor**: periodic reads and the give-up policy for devices that are off
//! - **State**: the device model and attribute diffing
//! - **Transport**: the TCP connection and receive loop
//! - **Frame / Codec**: framing and encryption
//! - **Protocol**: JSON message structures

mod client;
pub mod codec;
mod config;
mod error;
pub mod frame;
mod poller;
mod protocol;
mod state;
mod subscription;
mod supervisor;
pub mod tables;
mod transport;
mod types;

// Public exports
pub use client::Soundbar;
pub use config::{
    DeviceConfig, DEFAULT_COMMAND_RECONNECT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_POLL_INTERVAL,
    DEFAULT_PORT, DEFAULT_VOLUME_STEP,
};
pub use error::{Result, SoundbarError};
pub use protocol::{
    Command, Data, EqualizerInfo, FunctionInfo, Message, MessageKind, Method, PlayInfo, ProductInfo,
    Response, Setting, SettingValue, SettingsInfo, SpeakerInfo,
};
pub use state::{diff, affected_attributes, DeviceAttributes, DeviceState, Features, Level};
pub use subscription::{DeviceEvent, EventReceiver};
pub use supervisor::{PollDecision, ReconnectSupervisor, SupervisorState, MAX_RETRIES};
pub use transport::{InboundHandler, LinkState, Transport};
pub use types::{
    Attribute, AttributeValue, Changeset, CommandStatus, DeviceId, PlayerState, SoundbarCommand,
};
