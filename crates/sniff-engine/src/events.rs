//! Notifications published on the event bus
//!
//! The worker announces everything it observes (port opened, devices,
//! packets, state transitions) through a single [`Notification`] enum; each
//! variant belongs to exactly one [`Topic`].

use std::sync::Arc;

use sniff_protocol::Packet;

use crate::devices::Device;
use crate::state::SessionState;

/// Topics subscribers can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// The transport opened a port
    PortFound,
    /// An advertiser was seen
    DeviceFound,
    /// Every decoded packet
    PacketReceived,
    /// Session state transitions
    StateChanged,
    /// The followed device entered a connection
    ConnectRequest,
    /// The followed connection ended
    ConnectionEnded,
}

/// A notification published by the engine
#[derive(Debug, Clone)]
pub enum Notification {
    /// The transport opened `port`
    PortFound {
        /// Port identifier
        port: String,
    },

    /// An advertiser was seen
    DeviceFound {
        /// Device with its latest metadata
        device: Device,
    },

    /// A packet was decoded and appended to the buffer
    PacketReceived {
        /// The packet
        packet: Arc<Packet>,
    },

    /// The session state changed
    StateChanged {
        /// Previous state
        from: SessionState,
        /// New state
        to: SessionState,
    },

    /// The followed device entered a connection
    ConnectRequest {
        /// The CONNECT_REQ packet
        packet: Arc<Packet>,
    },

    /// The followed connection ended
    ConnectionEnded {
        /// Packets seen during the connection
        packets_in_connection: u64,
    },
}

impl Notification {
    /// Topic this notification is published on
    pub fn topic(&self) -> Topic {
        match self {
            Notification::PortFound { .. } => Topic::PortFound,
            Notification::DeviceFound { .. } => Topic::DeviceFound,
            Notification::PacketReceived { .. } => Topic::PacketReceived,
            Notification::StateChanged { .. } => Topic::StateChanged,
            Notification::ConnectRequest { .. } => Topic::ConnectRequest,
            Notification::ConnectionEnded { .. } => Topic::ConnectionEnded,
        }
    }

    /// Packet carried by this notification, if any
    pub fn packet(&self) -> Option<&Arc<Packet>> {
        match self {
            Notification::PacketReceived { packet } | Notification::ConnectRequest { packet } => {
                Some(packet)
            }
            _ => None,
        }
    }
}
