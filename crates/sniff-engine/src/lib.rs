//! BLE Sniffer Acquisition Engine
//!
//! This crate drives a BLE sniffer device from the host side. A single
//! background worker owns the serial link, decodes packets, keeps the packet
//! buffer and session statistics up to date, and publishes what it sees on an
//! in-process event bus. The [`Sniffer`] handle exposes the command and query
//! surface to any number of caller threads.
//!
//! # Architecture
//!
//! - [`EventBus`]: topic-based publish/subscribe, handlers run on the worker
//! - [`PacketBuffer`]: bounded packet store with a consumption cursor
//! - [`SessionStatistics`]: missed packets and connection tracking
//! - [`Sniffer`]: state machine and worker task behind a command surface
//! - [`DeviceList`]: advertisers discovered during the session
//!
//! # Session states
//!
//! ```text
//! Stopped ─start─► Initializing ─setup─► Scanning ─follow─► Following
//!                                            ▲                │  ▲
//!                                          scan      CONNECT_REQ  terminate /
//!                                            │                ▼  │ link loss
//!                                           any            InConnection
//!
//! any ─exit─► Exiting ─drain─► Stopped
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use sniff_engine::{EngineConfig, Sniffer};
//!
//! # async fn run() -> Result<(), sniff_engine::SnifferError> {
//! sniff_engine::logging::init();
//!
//! let sniffer = Sniffer::new(EngineConfig::with_port("/dev/ttyACM0"));
//! sniffer.set_adv_hop_sequence(&[37, 38, 39])?;
//! sniffer.start()?;
//!
//! tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//! for device in sniffer.get_devices() {
//!     println!("{} {:?}", device.address, device.name);
//! }
//!
//! let good_exit = sniffer.exit(true).await;
//! assert_eq!(good_exit, Some(true));
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod bus;
pub mod config;
pub mod devices;
pub mod error;
pub mod events;
pub mod logging;
pub mod sniffer;
pub mod state;
pub mod stats;
pub mod transport;
mod worker;

pub use buffer::PacketBuffer;
pub use bus::{EventBus, HandlerError, SubscriptionId};
pub use config::EngineConfig;
pub use devices::{Device, DeviceList};
pub use error::{ConfigError, SnifferError, TransportError};
pub use events::{Notification, Topic};
pub use sniffer::Sniffer;
pub use state::{FollowTarget, Session, SessionState};
pub use stats::{SessionStatistics, StatisticsSnapshot};
pub use transport::{SerialTransport, StreamTransport, Transport};
pub use worker::WorkerCommand;
