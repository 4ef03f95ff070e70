//! BLE Sniffer Simulation Library
//!
//! This crate provides a virtual sniffer board for exercising the host driver
//! without hardware. It includes:
//!
//! - **VirtualSniffer**: models the firmware side of the serial link with its
//!   own packet counter, encoding scripted air traffic as device frames
//! - **run_virtual_sniffer_task**: an async actor that serves a
//!   `VirtualSniffer` over any byte stream, typically one end of
//!   `tokio::io::duplex()`
//!
//! # Example
//!
//! ```rust
//! use sniff_sim::{SimEvent, VirtualSniffer};
//!
//! let mut sniffer = VirtualSniffer::new("sim-1");
//! sniffer.emit(SimEvent::Advertise {
//!     address: "AA:BB:CC:DD:EE:FF".parse().unwrap(),
//!     name: Some("Thermometer".to_string()),
//! });
//!
//! while let Some(bytes) = sniffer.take_output() {
//!     println!("Device output: {:02X?}", bytes);
//! }
//! ```

pub mod device;
pub mod task;

pub use device::{SimEvent, VirtualSniffer, DEFAULT_FW_VERSION, SIM_CONNECTION_ACCESS_ADDRESS};
pub use task::{run_virtual_sniffer_task, VirtualSnifferCommand};
