//! Acquisition worker
//!
//! A single tokio task owns the transport for the whole session. It pumps
//! bytes into the codec, feeds decoded packets through statistics, buffer and
//! bus, and applies queued commands between reads. It is the only writer of
//! session state and of the packet buffer.
//!
//! ```text
//! Sniffer ──cmd──► worker ──read──► codec ──► stats / buffer / bus
//!                    └──write──► device
//! ```

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use sniff_protocol::{
    HopSequence, HostRequest, Packet, PacketCodec, PacketKind, ParseError, TemporaryKey,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::buffer::PacketBuffer;
use crate::bus::EventBus;
use crate::config::EngineConfig;
use crate::devices::{Device, DeviceList};
use crate::error::TransportError;
use crate::events::Notification;
use crate::state::{FollowTarget, Session, SessionState};
use crate::transport::Transport;

const READ_CHUNK: usize = 4096;

/// Commands queued from the sniffer to the worker
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    /// Drop the follow target and scan all advertisers
    Scan,
    /// Follow one advertiser
    Follow(FollowTarget),
    /// Forward a temporary key to the device
    SendTemporaryKey(TemporaryKey),
    /// Forward an advertising hop sequence to the device
    SetAdvHopSequence(HopSequence),
    /// Wake the worker so it notices the exit flag
    Exit,
}

/// State shared between the sniffer handle and its worker
#[derive(Debug)]
pub(crate) struct Shared {
    pub session: Mutex<Session>,
    pub buffer: Mutex<PacketBuffer>,
    pub config: Mutex<EngineConfig>,
    pub exit_requested: AtomicBool,
    pub bus: EventBus,
    pub devices: DeviceList,
}

impl Shared {
    pub fn new(config: EngineConfig) -> Self {
        let buffer = PacketBuffer::new(config.buffer_capacity);
        Self {
            session: Mutex::new(Session::new()),
            buffer: Mutex::new(buffer),
            config: Mutex::new(config),
            exit_requested: AtomicBool::new(false),
            bus: EventBus::new(),
            devices: DeviceList::new(),
        }
    }

    pub fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn buffer(&self) -> MutexGuard<'_, PacketBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> MutexGuard<'_, EngineConfig> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change state and announce it; the session lock is released before
    /// handlers run
    pub fn set_state(&self, to: SessionState) {
        let changed = self.session().transition(to);
        self.announce(changed, to);
    }

    /// Record the worker's outcome and move to Stopped
    pub fn finish(&self, good_exit: bool, failure: Option<String>) {
        let changed = {
            let mut session = self.session();
            session.good_exit = Some(good_exit);
            if session.failure.is_none() {
                session.failure = failure;
            }
            session.transition(SessionState::Stopped)
        };
        self.announce(changed, SessionState::Stopped);
    }

    pub fn announce(&self, changed: Option<SessionState>, to: SessionState) {
        if let Some(from) = changed {
            debug!("Session {} -> {}", from, to);
            self.bus.publish(&Notification::StateChanged { from, to });
        }
    }

    fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::Acquire)
    }
}

/// How a session loop ended without a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    /// Exit requested and drain completed
    Clean,
    /// Stopped before the session was fully up, or orphaned
    Interrupted,
}

/// Run a complete session: setup, read loop, drain
///
/// Never returns an error; the outcome lands in `Session::good_exit`.
pub(crate) async fn run_worker<T, C>(
    shared: Arc<Shared>,
    mut transport: T,
    codec: C,
    cmd_rx: mpsc::UnboundedReceiver<WorkerCommand>,
) where
    T: Transport,
    C: PacketCodec + 'static,
{
    shared.set_state(SessionState::Initializing);

    let config = shared.config().clone();
    let outcome = match open(&shared, &mut transport, &config) {
        Ok(io) => {
            let mut worker = Worker {
                shared: shared.clone(),
                io,
                codec,
                cmd_rx,
                config,
                pending: Vec::new(),
                chunk: vec![0u8; READ_CHUNK],
                last_packet_at: Instant::now(),
            };
            worker.run().await
        }
        Err(e) => Err(e),
    };

    let (good_exit, failure) = match outcome {
        Ok(Ending::Clean) => (true, None),
        Ok(Ending::Interrupted) => (false, Some("session interrupted".to_string())),
        Err(e) => {
            error!("Sniffer worker stopped: {}", e);
            (false, Some(e.to_string()))
        }
    };
    shared.finish(good_exit, failure);
    info!("Sniffer worker ended (good exit: {})", good_exit);
}

fn open<T: Transport>(
    shared: &Shared,
    transport: &mut T,
    config: &EngineConfig,
) -> Result<T::Io, TransportError> {
    let port = config
        .port
        .clone()
        .or_else(|| transport.default_port())
        .ok_or(TransportError::NoPort)?;
    let io = transport.open(&port, config.baud_rate)?;
    info!("Opened sniffer on {} at {} baud", port, config.baud_rate);
    shared.bus.publish(&Notification::PortFound { port });
    Ok(io)
}

struct Worker<Io, C> {
    shared: Arc<Shared>,
    io: Io,
    codec: C,
    cmd_rx: mpsc::UnboundedReceiver<WorkerCommand>,
    config: EngineConfig,
    /// Received bytes not yet decoded
    pending: Vec<u8>,
    chunk: Vec<u8>,
    last_packet_at: Instant,
}

impl<Io, C> Worker<Io, C>
where
    Io: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
    C: PacketCodec,
{
    async fn run(&mut self) -> Result<Ending, TransportError> {
        self.setup().await?;
        if self.shared.exit_requested() {
            info!("Exit requested during setup");
            self.release().await;
            return Ok(Ending::Interrupted);
        }
        self.shared.set_state(SessionState::Scanning);

        let read_timeout = self.config.read_timeout();
        loop {
            if self.shared.exit_requested() {
                self.drain().await;
                return Ok(Ending::Clean);
            }
            self.check_link_timeout();

            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        // The flag is already set; picked up at the top of the loop
                        Some(WorkerCommand::Exit) => {}
                        Some(cmd) => self.apply(cmd).await?,
                        None => {
                            warn!("Sniffer handle dropped without exit");
                            self.release().await;
                            return Ok(Ending::Interrupted);
                        }
                    }
                }

                result = tokio::time::timeout(read_timeout, self.io.read(&mut self.chunk)) => {
                    match result {
                        Ok(Ok(0)) => return Err(TransportError::Disconnected),
                        Ok(Ok(n)) => self.ingest(n),
                        Ok(Err(e)) if e.kind() == ErrorKind::WouldBlock => {}
                        Ok(Err(e)) => return Err(TransportError::Io(e)),
                        Err(_) => {} // Timeout, loop around
                    }
                }
            }
        }
    }

    /// Ping, hop sequence, optional key, then scan
    async fn setup(&mut self) -> Result<(), TransportError> {
        let ping = self.codec.encode(&HostRequest::Ping);
        self.send(&ping).await?;

        let hop = self.codec.encode_hop_sequence(&self.config.hop_sequence);
        self.send(&hop).await?;

        if let Some(key) = self.config.temporary_key {
            let tk = self.codec.encode_tk(&key);
            self.send(&tk).await?;
        }

        let scan = self.codec.encode(&HostRequest::ScanContinuously);
        self.send(&scan).await?;
        debug!("Device setup sent");
        Ok(())
    }

    async fn apply(&mut self, cmd: WorkerCommand) -> Result<(), TransportError> {
        match cmd {
            WorkerCommand::Scan => {
                self.close_connection();
                self.shared.session().target = None;
                let bytes = self.codec.encode(&HostRequest::ScanContinuously);
                self.send(&bytes).await?;
                self.shared.set_state(SessionState::Scanning);
                info!("Scanning for advertisers");
            }
            WorkerCommand::Follow(target) => {
                self.close_connection();
                let bytes = self.codec.encode(&HostRequest::Follow {
                    address: target.address,
                    kind: target.kind,
                    follow_only_advertisements: target.follow_only_advertisements,
                });
                self.send(&bytes).await?;
                self.shared.session().target = Some(target);
                self.shared.set_state(SessionState::Following);
                info!(
                    "Following {}{}",
                    target.address,
                    if target.follow_only_advertisements {
                        " (advertisements only)"
                    } else {
                        ""
                    }
                );
            }
            WorkerCommand::SendTemporaryKey(key) => {
                let bytes = self.codec.encode_tk(&key);
                self.send(&bytes).await?;
                debug!("Temporary key sent");
            }
            WorkerCommand::SetAdvHopSequence(sequence) => {
                let bytes = self.codec.encode_hop_sequence(&sequence);
                self.send(&bytes).await?;
                debug!("Hop sequence {:?} sent", sequence.numbers());
            }
            WorkerCommand::Exit => {}
        }
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.io.write_all(bytes).await?;
        self.io.flush().await?;
        debug!("Sent {} bytes", bytes.len());
        Ok(())
    }

    fn ingest(&mut self, n: usize) {
        self.pending.extend_from_slice(&self.chunk[..n]);
        self.decode_pending();
    }

    fn decode_pending(&mut self) {
        while !self.pending.is_empty() {
            match self.codec.decode(&self.pending) {
                Ok((packet, used)) => {
                    self.pending.drain(..used.min(self.pending.len()));
                    self.handle_packet(packet);
                }
                Err(ParseError::Incomplete) => break,
                Err(ParseError::InvalidFrame { discard, reason }) => {
                    let discard = discard.clamp(1, self.pending.len());
                    warn!("Discarding {} bytes: {}", discard, reason);
                    self.pending.drain(..discard);
                }
            }
        }
    }

    fn handle_packet(&mut self, packet: Packet) {
        let packet = Arc::new(packet);
        self.last_packet_at = Instant::now();

        {
            let mut session = self.shared.session();
            let gap = session.stats.record_counter(packet.counter);
            if gap > 0 {
                debug!("Missed {} packets before counter {}", gap, packet.counter);
            }
            if session.state == SessionState::InConnection {
                session.stats.count_connection_packet();
            }
            if let Some(version) = packet.firmware_version() {
                info!("Sniffer firmware version {}", version);
                session.fw_version = Some(version);
            }
        }

        self.shared.buffer().append(packet.clone());

        self.shared.bus.publish(&Notification::PacketReceived {
            packet: packet.clone(),
        });
        if let Some(device) = Device::from_packet(&packet) {
            self.shared.bus.publish(&Notification::DeviceFound { device });
        }

        self.evaluate_transitions(&packet);
    }

    fn evaluate_transitions(&mut self, packet: &Arc<Packet>) {
        let (state, target) = {
            let session = self.shared.session();
            (session.state, session.target)
        };

        match (state, packet.kind) {
            (SessionState::Following, PacketKind::ConnectRequest) => {
                let Some(target) = target else { return };
                if target.follow_only_advertisements || packet.advertiser != Some(target.address)
                {
                    return;
                }
                let changed = self.shared.session().enter_connection(packet.clone());
                self.shared.announce(changed, SessionState::InConnection);
                info!(
                    "Connection to {} started at packet {}",
                    target.address, packet.counter
                );
                self.shared.bus.publish(&Notification::ConnectRequest {
                    packet: packet.clone(),
                });
            }
            (SessionState::InConnection, kind) if kind.ends_connection() => {
                info!("Connection ended ({})", kind.name());
                self.end_connection();
            }
            _ => {}
        }
    }

    fn check_link_timeout(&mut self) {
        if self.shared.session().state != SessionState::InConnection {
            return;
        }
        if self.last_packet_at.elapsed() >= self.config.link_timeout() {
            warn!(
                "No packets for {:?}, connection considered lost",
                self.config.link_timeout()
            );
            self.end_connection();
        }
    }

    /// Close a live connection before retargeting or scanning
    fn close_connection(&mut self) {
        if self.shared.session().state == SessionState::InConnection {
            self.end_connection();
        }
    }

    fn end_connection(&mut self) {
        self.shared.set_state(SessionState::Following);
        let packets_in_connection = self.shared.session().stats.packets_in_last_connection();
        self.shared.bus.publish(&Notification::ConnectionEnded {
            packets_in_connection,
        });
    }

    /// Process data already in flight, bounded by the drain timeout
    async fn drain(&mut self) {
        self.shared.set_state(SessionState::Exiting);
        let drain_timeout = self.config.drain_timeout();
        let deadline = Instant::now() + drain_timeout;
        let step = self.config.read_timeout().min(drain_timeout);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining.min(step), self.io.read(&mut self.chunk)).await {
                Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
                Ok(Ok(n)) => self.ingest(n),
            }
        }
        if !self.pending.is_empty() {
            debug!("Dropping {} undecoded bytes at exit", self.pending.len());
        }
        self.release().await;
        info!("Drain complete");
    }

    /// Put the device to sleep and close the stream
    async fn release(&mut self) {
        let idle = self.codec.encode(&HostRequest::GoIdle);
        match tokio::time::timeout(self.config.read_timeout(), self.send(&idle)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Could not send go-idle: {}", e),
            Err(_) => debug!("Timed out sending go-idle"),
        }
        if let Err(e) = self.io.shutdown().await {
            debug!("Transport shutdown failed: {}", e);
        }
    }
}
