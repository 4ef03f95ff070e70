//! Session state tracking

use std::fmt;
use std::sync::Arc;

use sniff_protocol::{AddressKind, DeviceAddress, Packet};

use crate::stats::SessionStatistics;

/// Acquisition session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No worker running
    #[default]
    Stopped,
    /// Worker is opening the transport and configuring the device
    Initializing,
    /// Device reports every advertiser it hears
    Scanning,
    /// Device tracks one advertiser
    Following,
    /// The followed advertiser is in a connection
    InConnection,
    /// Worker is draining before it stops
    Exiting,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stopped => "STOPPED",
            Self::Initializing => "INITIALIZING",
            Self::Scanning => "SCANNING",
            Self::Following => "FOLLOWING",
            Self::InConnection => "IN_CONNECTION",
            Self::Exiting => "EXITING",
        }
    }

    /// Whether the worker is past setup and still sniffing
    pub fn is_sniffing(&self) -> bool {
        matches!(self, Self::Scanning | Self::Following | Self::InConnection)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Device the engine was asked to follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowTarget {
    pub address: DeviceAddress,
    pub kind: AddressKind,
    /// Ignore connections and keep reporting advertisements only
    pub follow_only_advertisements: bool,
}

/// Mutable session data shared between the worker and the command surface
///
/// State, statistics and firmware details are written only by the worker.
/// `scan()` clears the follow target directly so it takes effect at once.
#[derive(Debug, Default)]
pub struct Session {
    pub state: SessionState,
    pub stats: SessionStatistics,
    pub target: Option<FollowTarget>,
    /// Firmware version from the ping response
    pub fw_version: Option<u16>,
    /// `None` until the worker has stopped
    pub good_exit: Option<bool>,
    /// Why the worker stopped, when it did not exit cleanly
    pub failure: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `to`, returning the previous state if it changed
    pub fn transition(&mut self, to: SessionState) -> Option<SessionState> {
        let from = self.state;
        if from == to {
            return None;
        }
        self.state = to;
        self.stats_follow_state();
        Some(from)
    }

    /// Move to InConnection and start tracking the connection in one step
    ///
    /// Returns the previous state, or `None` if already in connection.
    pub fn enter_connection(&mut self, connect_request: Arc<Packet>) -> Option<SessionState> {
        let from = self.transition(SessionState::InConnection)?;
        self.stats.enter_connection(connect_request);
        Some(from)
    }

    fn stats_follow_state(&mut self) {
        if self.state != SessionState::InConnection && self.stats.in_connection() {
            self.stats.leave_connection();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sniff_protocol::PacketKind;

    #[test]
    fn test_transition_reports_previous_state() {
        let mut session = Session::new();
        assert_eq!(session.state, SessionState::Stopped);

        assert_eq!(
            session.transition(SessionState::Initializing),
            Some(SessionState::Stopped)
        );
        assert_eq!(session.transition(SessionState::Initializing), None);
        assert_eq!(session.state.to_string(), "INITIALIZING");
    }

    #[test]
    fn test_leaving_connection_freezes_count() {
        let mut session = Session::new();
        session.transition(SessionState::InConnection);
        session
            .stats
            .enter_connection(Arc::new(Packet::new(0x06, 1, PacketKind::ConnectRequest, vec![])));
        session.stats.count_connection_packet();

        session.transition(SessionState::Scanning);
        assert!(!session.stats.in_connection());
        session.stats.count_connection_packet();
        assert_eq!(session.stats.packets_in_last_connection(), 1);
    }

    #[test]
    fn test_enter_connection_updates_state_and_stats_together() {
        let mut session = Session::new();
        session.transition(SessionState::Following);

        let connect = Arc::new(Packet::new(0x06, 42, PacketKind::ConnectRequest, vec![]));
        assert_eq!(
            session.enter_connection(connect.clone()),
            Some(SessionState::Following)
        );
        assert_eq!(session.state, SessionState::InConnection);
        assert!(session.stats.in_connection());
        assert_eq!(session.stats.connect_event_packet_counter_value(), Some(42));

        // Already in connection: nothing restarts
        session.stats.count_connection_packet();
        assert_eq!(session.enter_connection(connect), None);
        assert_eq!(session.stats.packets_in_last_connection(), 1);
    }

    #[test]
    fn test_sniffing_states() {
        assert!(SessionState::Following.is_sniffing());
        assert!(!SessionState::Initializing.is_sniffing());
        assert!(!SessionState::Exiting.is_sniffing());
    }
}
