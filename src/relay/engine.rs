//! Single-socket UDP I/O loop: parses inbound datagrams, applies mode
//! policy, and drains/services the queues connecting to the Bridge.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Instant;

use log::{debug, error, info, warn};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::codec::Frame;
use crate::config::PendingReplyConfig;
use crate::constants::{CLOUD_IP, RELAY_IDLE_SLEEP_MS, UDP_PORT};
use crate::error::GatewayError;
use crate::relay::mode::{self, Decision, Direction};
use crate::relay::pending::PendingReplyTable;
use crate::relay::registry::DeviceRegistry;
use crate::config::Mode;

/// A command frame the Bridge wants delivered to a device.
#[derive(Debug, Clone)]
pub struct OutboundCommand {
    pub frame: Frame,
}

/// A frame the Relay Engine observed, handed to the Bridge regardless of
/// the active mode's forwarding decision.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub frame: Frame,
    pub direction: Direction,
    pub source: SocketAddr,
}

/// Engine construction parameters that don't change once running.
#[derive(Debug, Clone, Copy)]
pub struct RelayEngineConfig {
    pub mode: Mode,
    pub debug: bool,
    pub print_parsed_data: bool,
    pub mask: bool,
    pub pending_reply: PendingReplyConfig,
}

/// Owns the UDP socket, [`DeviceRegistry`], and [`PendingReplyTable`]. Not
/// `Clone`/`Sync` — exactly one task drives it, per §5's "single
/// reader/writer" rule.
pub struct RelayEngine {
    socket: UdpSocket,
    cloud_addr: SocketAddr,
    registry: DeviceRegistry,
    pending: PendingReplyTable,
    cfg: RelayEngineConfig,
}

impl RelayEngine {
    /// Binds `0.0.0.0:9997` with `SO_REUSEADDR`/`SO_REUSEPORT` set before
    /// the OS assigns the port, then hands the socket to tokio.
    pub fn bind(cfg: RelayEngineConfig) -> Result<Self, GatewayError> {
        let socket =
            Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(GatewayError::Socket)?;
        socket.set_reuse_address(true).map_err(GatewayError::Socket)?;
        #[cfg(unix)]
        socket.set_reuse_port(true).map_err(GatewayError::Socket)?;
        socket.set_nonblocking(true).map_err(GatewayError::Socket)?;
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), UDP_PORT);
        socket.bind(&addr.into()).map_err(GatewayError::Socket)?;

        let socket = UdpSocket::from_std(socket.into()).map_err(GatewayError::Socket)?;
        info!("relay engine bound to {addr} (mode={:?})", cfg.mode);

        Ok(RelayEngine {
            socket,
            cloud_addr: SocketAddr::new(IpAddr::V4(CLOUD_IP), UDP_PORT),
            registry: DeviceRegistry::new(),
            pending: PendingReplyTable::new(cfg.pending_reply),
            cfg,
        })
    }

    /// Runs until `shutdown` is cancelled, servicing commands from the
    /// Bridge, inbound datagrams, and periodic Pending-Reply resends.
    pub async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<OutboundCommand>,
        event_tx: mpsc::Sender<InboundEvent>,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(RELAY_IDLE_SLEEP_MS));
        let mut buf = [0u8; 2048];

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("relay engine shutting down");
                    break;
                }
                Some(command) = command_rx.recv() => {
                    self.handle_outbound_command(command).await;
                }
                recv = self.socket.recv_from(&mut buf) => {
                    match recv {
                        Ok((len, source)) => self.handle_datagram(&buf[..len], source, &event_tx).await,
                        Err(err) => error!("udp recv error: {err}"),
                    }
                }
                _ = ticker.tick() => {
                    self.tick_pending_replies().await;
                }
            }
        }
    }

    async fn handle_outbound_command(&mut self, command: OutboundCommand) {
        let device_id = command.frame.payload.device_id;
        let Some(addr) = self.registry.lookup(device_id) else {
            warn!("dropping command for unknown device {device_id:#010x}");
            return;
        };
        let now = Instant::now();
        let mut frame = command.frame;
        if frame.payload.seq != crate::constants::SEQ_UNSOLICITED {
            match self.pending.enqueue(frame.clone(), now) {
                Ok(seq) => frame.payload.seq = seq,
                Err(_) => {
                    error!("pending-reply table full, dropping command for {device_id:#010x}");
                    return;
                }
            }
        }
        self.send(&frame, addr).await;
    }

    async fn handle_datagram(
        &mut self,
        bytes: &[u8],
        source: SocketAddr,
        event_tx: &mpsc::Sender<InboundEvent>,
    ) {
        let frame = match Frame::parse(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                debug!("dropping malformed datagram from {source}: {err}");
                return;
            }
        };
        self.dump_parsed(&frame, source);

        let (direction, destination) = if source == self.cloud_addr {
            (Direction::FromCloud, self.registry.lookup(frame.payload.device_id))
        } else {
            self.pending.on_client_reply(frame.payload.seq);
            self.registry.learn(frame.payload.device_id, source);
            (Direction::FromDevice, Some(self.cloud_addr))
        };

        let _ = event_tx
            .send(InboundEvent {
                frame: frame.clone(),
                direction,
                source,
            })
            .await;

        match mode::decide(self.cfg.mode, direction, &frame.payload) {
            Decision::Forward => {
                if let Some(destination) = destination {
                    self.send(&frame, destination).await;
                } else {
                    debug!("dropping frame for unknown device {:#010x}", frame.payload.device_id);
                }
            }
            Decision::Drop => {}
            Decision::Synthesize(payload) => {
                let reply = Frame {
                    message_id: frame.message_id,
                    payload,
                };
                self.send(&reply, source).await;
            }
        }
    }

    async fn tick_pending_replies(&mut self) {
        let due = self.pending.tick(Instant::now());
        for frame in due {
            let Some(addr) = self.registry.lookup(frame.payload.device_id) else {
                continue;
            };
            self.send(&frame, addr).await;
        }
    }

    async fn send(&self, frame: &Frame, destination: SocketAddr) {
        let bytes = frame.build();
        if let Err(err) = self.socket.send_to(&bytes, destination).await {
            error!("udp send to {destination} failed: {err}");
        }
    }

    fn dump_parsed(&self, frame: &Frame, source: SocketAddr) {
        if !self.cfg.debug && !self.cfg.print_parsed_data {
            return;
        }
        if self.cfg.mask {
            debug!(
                "{source} -> type={:?} flags={:?} seq={}",
                frame.payload.message_type, frame.payload.message_flags, frame.payload.seq
            );
        } else {
            debug!("{source} -> {frame:?}");
        }
    }
}
