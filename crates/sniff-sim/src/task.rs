//! Virtual sniffer actor task
//!
//! Owns a [`VirtualSniffer`] and one end of an async stream. The task uses a
//! select! loop to:
//! - Read host requests from the stream, answering pings
//! - Emit scripted traffic on command
//! - Re-broadcast every decoded host request for test assertions

use std::io;

use sniff_protocol::HostRequest;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::device::{SimEvent, VirtualSniffer};

/// Commands that can be sent to a virtual sniffer task
#[derive(Debug, Clone)]
pub enum VirtualSnifferCommand {
    /// Encode and write these events, in order
    Emit(Vec<SimEvent>),
    /// Close the stream as if the board was unplugged
    Disconnect,
    /// Stop the task, leaving the stream open until it is dropped
    Shutdown,
}

/// Run the virtual sniffer task
///
/// Returns the sniffer when the task ends so callers can inspect its final
/// state.
pub async fn run_virtual_sniffer_task<S>(
    mut stream: S,
    mut sniffer: VirtualSniffer,
    mut cmd_rx: mpsc::Receiver<VirtualSnifferCommand>,
    request_tx: broadcast::Sender<HostRequest>,
) -> io::Result<VirtualSniffer>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 1024];
    info!("Starting virtual sniffer task for {}", sniffer.id());

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual sniffer stream closed for {}", sniffer.id());
                        break;
                    }
                    Ok(n) => {
                        for request in sniffer.receive(&buf[..n]) {
                            let _ = request_tx.send(request);
                        }
                        flush_output(&mut stream, &mut sniffer).await?;
                    }
                    Err(e) => {
                        warn!("Virtual sniffer {} stream error: {}", sniffer.id(), e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualSnifferCommand::Emit(events)) => {
                        debug!("Virtual sniffer {} emitting {} events", sniffer.id(), events.len());
                        for event in events {
                            sniffer.emit(event);
                        }
                        flush_output(&mut stream, &mut sniffer).await?;
                    }
                    Some(VirtualSnifferCommand::Disconnect) => {
                        info!("Virtual sniffer {} disconnecting", sniffer.id());
                        stream.shutdown().await?;
                        return Ok(sniffer);
                    }
                    Some(VirtualSnifferCommand::Shutdown) | None => {
                        info!("Shutdown requested for virtual sniffer {}", sniffer.id());
                        break;
                    }
                }
            }
        }
    }

    info!("Virtual sniffer task ended for {}", sniffer.id());
    Ok(sniffer)
}

async fn flush_output<S>(stream: &mut S, sniffer: &mut VirtualSniffer) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    while let Some(bytes) = sniffer.take_output() {
        stream.write_all(&bytes).await?;
    }
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sniff_protocol::{PacketCodec, PacketKind, SlipCodec};

    #[tokio::test]
    async fn test_task_answers_ping_and_emits() {
        let (mut host, device) = tokio::io::duplex(4096);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (request_tx, mut request_rx) = broadcast::channel(16);

        let task = tokio::spawn(run_virtual_sniffer_task(
            device,
            VirtualSniffer::new("sim").with_fw_version(0x0105),
            cmd_rx,
            request_tx,
        ));

        let mut codec = SlipCodec::new();
        host.write_all(&codec.encode(&HostRequest::Ping)).await.unwrap();
        assert_eq!(request_rx.recv().await.unwrap(), HostRequest::Ping);

        cmd_tx
            .send(VirtualSnifferCommand::Emit(vec![SimEvent::Advertise {
                address: "AA:BB:CC:DD:EE:FF".parse().unwrap(),
                name: None,
            }]))
            .await
            .unwrap();

        let mut received = Vec::new();
        let mut packets = Vec::new();
        let mut buf = [0u8; 1024];
        while packets.len() < 2 {
            let n = host.read(&mut buf).await.unwrap();
            received.extend_from_slice(&buf[..n]);
            while let Ok((packet, used)) = codec.decode(&received) {
                received.drain(..used);
                packets.push(packet);
            }
        }
        assert_eq!(packets[0].kind, PacketKind::PingResponse);
        assert_eq!(packets[0].firmware_version(), Some(0x0105));
        assert_eq!(packets[1].kind, PacketKind::Advertisement);

        cmd_tx.send(VirtualSnifferCommand::Shutdown).await.unwrap();
        let sniffer = task.await.unwrap().unwrap();
        assert_eq!(sniffer.requests(), &[HostRequest::Ping]);
    }

    #[tokio::test]
    async fn test_disconnect_closes_stream() {
        let (mut host, device) = tokio::io::duplex(1024);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (request_tx, _request_rx) = broadcast::channel(16);

        let task = tokio::spawn(run_virtual_sniffer_task(
            device,
            VirtualSniffer::new("sim"),
            cmd_rx,
            request_tx,
        ));
        cmd_tx.send(VirtualSnifferCommand::Disconnect).await.unwrap();
        task.await.unwrap().unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(host.read(&mut buf).await.unwrap(), 0);
    }
}
