use std::{
    io,
    net::SocketAddr,
    path::Path,
    time::{Duration, Instant},
};

use spin_proto::{
    Connection, Frame, MeasurementSnapshot, MonotonicClock, PacketHeader, ReceiveOutcome, Role,
};
use tokio::{
    net::UdpSocket,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, instrument, trace, warn};

use super::{
    config::{EndpointConfig, ObservabilityConfig},
    datagram::ProbeDatagram,
    observer::{write_observation, ObservableState, ProgramData},
};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// One end of a spin measurement session.
///
/// The task owns both the socket and the connection, so received and sent
/// packets are processed one at a time from the same loop.
pub struct EndpointTask<C: MonotonicClock> {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    connection: Connection<C>,
    config: EndpointConfig,
    observability: ObservabilityConfig,
    next_packet_number: u64,
    payload: Vec<u8>,
    send_buf: Vec<u8>,
    started: Instant,
}

impl<C: MonotonicClock> EndpointTask<C> {
    pub async fn bind(
        config: EndpointConfig,
        observability: ObservabilityConfig,
        clock: C,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(config.listen).await?;
        Ok(Self::new(socket, config, observability, clock))
    }

    pub fn new(
        socket: UdpSocket,
        config: EndpointConfig,
        observability: ObservabilityConfig,
        clock: C,
    ) -> Self {
        Self {
            socket,
            peer: config.peer,
            connection: Connection::new(config.role, clock),
            payload: vec![0; config.payload_size],
            config,
            observability,
            // packet number 0 is never accepted by the receiving side
            next_packet_number: 1,
            send_buf: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn snapshot(&self) -> MeasurementSnapshot {
        self.connection.snapshot()
    }

    #[instrument(level = "debug", skip(self), fields(role = %self.config.role))]
    pub async fn run(&mut self) -> io::Result<()> {
        let mut buf = [0_u8; 2048];

        // interval() panics on a zero period
        let mut send_timer = interval(self.config.send_interval().max(MIN_INTERVAL));
        send_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut observe_timer =
            interval(self.observability.observation_interval().max(MIN_INTERVAL));
        observe_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let is_client = self.config.role == Role::Client;
        let observation_path = self.observability.observation_path.clone();

        info!(local = ?self.socket.local_addr().ok(), peer = ?self.peer, "endpoint started");

        loop {
            enum SelectResult {
                SendTimer,
                Recv(io::Result<(usize, SocketAddr)>),
                ObserveTimer,
            }

            let selected = tokio::select! {
                _ = send_timer.tick(), if is_client => SelectResult::SendTimer,
                result = self.socket.recv_from(&mut buf) => SelectResult::Recv(result),
                _ = observe_timer.tick(), if observation_path.is_some() => SelectResult::ObserveTimer,
            };

            match selected {
                SelectResult::SendTimer => {
                    if let Some(peer) = self.peer {
                        self.queue_probe_payload();
                        self.send_probe(peer).await;
                    }
                }
                SelectResult::Recv(Ok((size, source))) => {
                    if self.handle_datagram(&buf[..size], source) && !is_client {
                        // the server answers right away, without payload of its own
                        self.send_probe(source).await;
                    }
                }
                SelectResult::Recv(Err(error))
                    if matches!(
                        error.kind(),
                        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
                    ) =>
                {
                    // peer not (yet) listening, keep probing
                    debug!(?error, "peer unreachable");
                }
                SelectResult::Recv(Err(error)) => {
                    warn!(?error, "could not receive datagram");
                    return Err(error);
                }
                SelectResult::ObserveTimer => {
                    if let Some(path) = &observation_path {
                        self.observe(path).await;
                    }
                }
            }
        }
    }

    /// Returns whether the datagram came from our peer and was well formed
    fn handle_datagram(&mut self, data: &[u8], source: SocketAddr) -> bool {
        if matches!(self.peer, Some(peer) if peer != source) {
            debug!(%source, "ignoring datagram from unknown source");
            return false;
        }

        let datagram = match ProbeDatagram::deserialize(data) {
            Ok(datagram) => datagram,
            Err(error) => {
                debug!(%error, %source, "ignoring malformed datagram");
                return false;
            }
        };

        if self.peer.is_none() {
            info!(%source, "accepting peer");
            self.peer = Some(source);
        }

        let outcome = self.connection.handle_incoming(&datagram.header);
        match outcome {
            ReceiveOutcome::Reordered => {
                debug!(
                    packet_number = datagram.header.packet_number,
                    "reordered probe"
                )
            }
            ReceiveOutcome::Edge => {
                trace!(
                    packet_number = datagram.header.packet_number,
                    "spin edge received"
                )
            }
            ReceiveOutcome::Accepted => {}
        }

        true
    }

    fn queue_probe_payload(&mut self) {
        self.connection
            .queues_mut()
            .queue_protected(Frame::new(self.payload.clone()));
    }

    async fn send_probe(&mut self, peer: SocketAddr) {
        let measurement = self.connection.next_measurement();
        let payload: Vec<u8> = self
            .connection
            .queues_mut()
            .take_pending()
            .into_iter()
            .flat_map(|frame| frame.payload)
            .collect();

        let datagram = ProbeDatagram {
            header: PacketHeader {
                packet_number: self.next_packet_number,
                measurement,
            },
            payload: &payload,
        };
        datagram.serialize(&mut self.send_buf);
        self.next_packet_number += 1;

        match self.socket.send_to(&self.send_buf, peer).await {
            Ok(_) => debug!(
                packet_number = datagram.header.packet_number,
                measurement = measurement.to_byte(),
                "sent probe"
            ),
            Err(error) => warn!(?error, %peer, "could not send probe"),
        }
    }

    async fn observe(&self, path: &Path) {
        let state = ObservableState {
            program: ProgramData::with_uptime(self.started.elapsed().as_secs_f64()),
            role: self.config.role,
            local: self.socket.local_addr().ok(),
            peer: self.peer,
            measurement: self.connection.snapshot(),
        };

        if let Err(error) = write_observation(path, &state).await {
            warn!(?error, ?path, "could not write observation file");
        }
    }
}
