//! The sniffer handle: command and query surface over the worker

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use sniff_protocol::{DeviceAddress, HopSequence, Packet, PacketCodec, SlipCodec, TemporaryKey};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::bus::EventBus;
use crate::config::EngineConfig;
use crate::devices::{Device, DeviceList};
use crate::error::{ConfigError, SnifferError};
use crate::events::{Notification, Topic};
use crate::state::{FollowTarget, SessionState};
use crate::stats::StatisticsSnapshot;
use crate::transport::{SerialTransport, Transport};
use crate::worker::{run_worker, Shared, WorkerCommand};

/// Host driver for one sniffer device
///
/// All methods take `&self` and may be called from any thread while the
/// worker runs. Commands are validated synchronously and queued to the worker;
/// commands issued before [`Sniffer::start`] are applied right after device
/// setup. Queries return snapshots.
///
/// A `Sniffer` runs at most one session.
pub struct Sniffer {
    shared: Arc<Shared>,
    cmd_tx: mpsc::UnboundedSender<WorkerCommand>,
    cmd_rx: Mutex<Option<mpsc::UnboundedReceiver<WorkerCommand>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    join_lock: tokio::sync::Mutex<()>,
}

impl Default for Sniffer {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for Sniffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sniffer")
            .field("state", &self.state())
            .field("port", &self.port())
            .finish()
    }
}

impl Sniffer {
    /// Create a stopped sniffer
    pub fn new(config: EngineConfig) -> Self {
        let shared = Arc::new(Shared::new(config));
        shared.devices.attach(&shared.bus);

        // The port actually opened wins over the configured one
        let weak: Weak<Shared> = Arc::downgrade(&shared);
        shared.bus.subscribe(Topic::PortFound, move |notification| {
            if let (Some(shared), Notification::PortFound { port }) = (weak.upgrade(), notification)
            {
                shared.config().port = Some(port.clone());
            }
            Ok(())
        });

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        Self {
            shared,
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
            worker: Mutex::new(None),
            join_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Start sniffing on the configured serial port
    pub fn start(&self) -> Result<(), SnifferError> {
        self.start_with_transport(SerialTransport)
    }

    /// Start sniffing over a custom transport
    pub fn start_with_transport<T: Transport>(&self, transport: T) -> Result<(), SnifferError> {
        self.start_with_codec(transport, SlipCodec::new())
    }

    /// Start sniffing over a custom transport and codec
    ///
    /// Must be called from within a tokio runtime; the worker is spawned on it.
    pub fn start_with_codec<T, C>(&self, transport: T, codec: C) -> Result<(), SnifferError>
    where
        T: Transport,
        C: PacketCodec + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SnifferError::NoRuntime(e.to_string()))?;
        let cmd_rx = self
            .cmd_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SnifferError::AlreadyStarted)?;

        info!("Starting sniffer {}", self.sw_version());
        let handle = runtime.spawn(run_worker(self.shared.clone(), transport, codec, cmd_rx));
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    fn queue(&self, cmd: WorkerCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            debug!("Worker gone, command dropped");
        }
    }

    /// Scan all advertisers, dropping any follow target
    ///
    /// The follow target is cleared at once. The state change happens on the
    /// worker: on a stopped sniffer the command is queued and the state stays
    /// `Stopped` until [`Sniffer::start`] completes setup, after which the
    /// queued scan is applied.
    pub fn scan(&self) {
        self.shared.session().target = None;
        self.queue(WorkerCommand::Scan);
    }

    /// Follow a device previously reported by the device list
    pub fn follow(
        &self,
        address: DeviceAddress,
        follow_only_advertisements: bool,
    ) -> Result<(), SnifferError> {
        let device = self
            .shared
            .devices
            .get(&address)
            .ok_or(ConfigError::UnknownDevice(address))?;
        self.queue(WorkerCommand::Follow(FollowTarget {
            address,
            kind: device.kind,
            follow_only_advertisements,
        }));
        Ok(())
    }

    /// Set the temporary key (1 to 16 bytes, left-padded) and forward it
    pub fn send_tk(&self, key: &[u8]) -> Result<(), SnifferError> {
        let key = TemporaryKey::from_bytes(key)?;
        self.set_tk(key);
        Ok(())
    }

    /// Derive the temporary key from a six-digit pairing passkey
    pub fn send_passkey(&self, passkey: u32) -> Result<(), SnifferError> {
        let key = TemporaryKey::from_passkey(passkey)?;
        self.set_tk(key);
        Ok(())
    }

    fn set_tk(&self, key: TemporaryKey) {
        self.shared.config().temporary_key = Some(key);
        self.queue(WorkerCommand::SendTemporaryKey(key));
    }

    /// Set the advertising channel hop order and forward it
    pub fn set_adv_hop_sequence(&self, channels: &[u8]) -> Result<(), SnifferError> {
        let sequence = HopSequence::new(channels)?;
        self.shared.config().hop_sequence = sequence.clone();
        self.queue(WorkerCommand::SetAdvHopSequence(sequence));
        Ok(())
    }

    /// Port used by the next `start`
    pub fn set_port(&self, port: impl Into<String>) {
        self.shared.config().port = Some(port.into());
    }

    /// Ask the worker to drain and stop, without waiting
    pub fn request_exit(&self) {
        self.shared.exit_requested.store(true, Ordering::Release);
        self.queue(WorkerCommand::Exit);
    }

    /// Wait for the worker to stop and return its exit status
    ///
    /// Returns `None` if the sniffer was never started.
    pub async fn join(&self) -> Option<bool> {
        let _joining = self.join_lock.lock().await;
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Sniffer worker failed: {}", e);
                self.shared.finish(false, Some(format!("worker task failed: {}", e)));
            }
        }
        self.good_exit()
    }

    /// Request exit and optionally wait for the worker to stop
    pub async fn exit(&self, join: bool) -> Option<bool> {
        self.request_exit();
        if join {
            self.join().await
        } else {
            self.good_exit()
        }
    }

    /// Consume buffered packets; `None` takes everything unread
    pub fn get_packets(&self, limit: Option<usize>) -> Vec<Arc<Packet>> {
        self.shared.buffer().consume(limit)
    }

    /// Packets not yet handed out
    pub fn unread_packets(&self) -> usize {
        self.shared.buffer().unread()
    }

    /// Unread packets lost to buffer overflow
    pub fn evicted_packets(&self) -> u64 {
        self.shared.buffer().evicted_unread()
    }

    pub fn get_devices(&self) -> Vec<Device> {
        self.shared.devices.snapshot()
    }

    pub fn devices(&self) -> &DeviceList {
        &self.shared.devices
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.shared.bus
    }

    pub fn state(&self) -> SessionState {
        self.shared.session().state
    }

    pub fn follow_target(&self) -> Option<FollowTarget> {
        self.shared.session().target
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.shared.session().stats.snapshot()
    }

    pub fn missed_packets(&self) -> u64 {
        self.shared.session().stats.missed_packets()
    }

    pub fn packets_in_last_connection(&self) -> u64 {
        self.shared.session().stats.packets_in_last_connection()
    }

    pub fn connect_event_packet_counter_value(&self) -> Option<u16> {
        self.shared.session().stats.connect_event_packet_counter_value()
    }

    pub fn current_connect_request(&self) -> Option<Arc<Packet>> {
        self.shared.session().stats.current_connect_request()
    }

    pub fn in_connection(&self) -> bool {
        self.shared.session().stats.in_connection()
    }

    /// `None` until the worker has stopped
    pub fn good_exit(&self) -> Option<bool> {
        self.shared.session().good_exit
    }

    /// Reason the worker stopped without a clean exit
    ///
    /// Transport failures end the session from the worker, so they surface
    /// here and through [`Sniffer::good_exit`] rather than as a returned error.
    pub fn failure(&self) -> Option<String> {
        self.shared.session().failure.clone()
    }

    /// Board identifier derived from the port the device was found on
    ///
    /// Follows [`Sniffer::port`], so it changes when `PortFound` reports a
    /// different port.
    pub fn board_id(&self) -> Option<String> {
        let port = self.shared.config().port.clone()?;
        let name = port
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(port.as_str());
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// Firmware version reported by the device's ping response
    pub fn fw_version(&self) -> Option<u16> {
        self.shared.session().fw_version
    }

    /// Host driver version
    pub fn sw_version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn port(&self) -> Option<String> {
        self.shared.config().port.clone()
    }

    /// Snapshot of the live configuration
    pub fn config(&self) -> EngineConfig {
        self.shared.config().clone()
    }
}
