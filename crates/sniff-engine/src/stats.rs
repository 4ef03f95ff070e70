//! Session statistics derived from the packet stream

use std::sync::Arc;

use sniff_protocol::Packet;

/// Counters maintained by the worker while packets flow through
#[derive(Debug, Default)]
pub struct SessionStatistics {
    last_counter: Option<u16>,
    missed_packets: u64,
    packets_received: u64,
    packets_in_last_connection: u64,
    connect_event_packet_counter_value: Option<u16>,
    current_connect_request: Option<Arc<Packet>>,
    in_connection: bool,
}

/// Point-in-time copy of [`SessionStatistics`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    /// Packets the device sent that never reached the host
    pub missed_packets: u64,
    /// Packets decoded this session
    pub packets_received: u64,
    /// Packets decoded during the current or most recent connection
    pub packets_in_last_connection: u64,
    /// Counter of the CONNECT_REQ that opened the latest connection
    pub connect_event_packet_counter_value: Option<u16>,
    /// Whether a followed connection is live
    pub in_connection: bool,
}

impl SessionStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a decoded packet's sequence counter
    ///
    /// Returns the number of packets missed since the previous one. The first
    /// packet of a session only establishes the baseline.
    pub fn record_counter(&mut self, counter: u16) -> u16 {
        self.packets_received += 1;
        let gap = match self.last_counter {
            Some(previous) => counter.wrapping_sub(previous.wrapping_add(1)),
            None => 0,
        };
        self.last_counter = Some(counter);
        self.missed_packets += u64::from(gap);
        gap
    }

    /// Start tracking a connection opened by `connect_request`
    pub fn enter_connection(&mut self, connect_request: Arc<Packet>) {
        self.connect_event_packet_counter_value = Some(connect_request.counter);
        self.current_connect_request = Some(connect_request);
        self.packets_in_last_connection = 0;
        self.in_connection = true;
    }

    /// Count a packet seen while in connection
    pub fn count_connection_packet(&mut self) {
        if self.in_connection {
            self.packets_in_last_connection += 1;
        }
    }

    /// Stop counting; the connection packet count stays frozen
    pub fn leave_connection(&mut self) {
        self.in_connection = false;
    }

    pub fn missed_packets(&self) -> u64 {
        self.missed_packets
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    pub fn packets_in_last_connection(&self) -> u64 {
        self.packets_in_last_connection
    }

    pub fn connect_event_packet_counter_value(&self) -> Option<u16> {
        self.connect_event_packet_counter_value
    }

    pub fn current_connect_request(&self) -> Option<Arc<Packet>> {
        self.current_connect_request.clone()
    }

    pub fn in_connection(&self) -> bool {
        self.in_connection
    }

    /// Consistent copy of every counter
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            missed_packets: self.missed_packets,
            packets_received: self.packets_received,
            packets_in_last_connection: self.packets_in_last_connection,
            connect_event_packet_counter_value: self.connect_event_packet_counter_value,
            in_connection: self.in_connection,
        }
    }
}
