use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    clock::MonotonicClock,
    measurement::{MeasurementField, MeasurementRecord, MeasurementState, ReceiveOutcome, Role},
};

/// The parts of a received packet header the measurement machinery consumes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_number: u64,
    pub measurement: MeasurementField,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Vec<u8>,
    pub needs_transmit: bool,
}

impl Frame {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            needs_transmit: true,
        }
    }
}

/// Frames queued for transmission, before and after the handshake keys are available
#[derive(Debug, Default)]
pub struct OutputQueues {
    cleartext: VecDeque<Frame>,
    protected: VecDeque<Frame>,
}

impl OutputQueues {
    pub fn queue_cleartext(&mut self, frame: Frame) {
        self.cleartext.push_back(frame);
    }

    pub fn queue_protected(&mut self, frame: Frame) {
        self.protected.push_back(frame);
    }

    /// Whether any frame in either queue still awaits transmission
    pub fn has_pending_frames(&self) -> bool {
        self.cleartext
            .iter()
            .chain(self.protected.iter())
            .any(|frame| frame.needs_transmit)
    }

    /// Take all frames awaiting transmission, cleartext first.
    ///
    /// Frames that no longer need transmitting are dropped from the queues.
    pub fn take_pending(&mut self) -> Vec<Frame> {
        self.cleartext
            .drain(..)
            .chain(self.protected.drain(..))
            .filter(|frame| frame.needs_transmit)
            .map(|mut frame| {
                frame.needs_transmit = false;
                frame
            })
            .collect()
    }
}

/// Counters describing the spin behaviour of a connection
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementSnapshot {
    pub role: Role,
    pub packets_accepted: u64,
    pub packets_reordered: u64,
    pub packets_sent: u64,
    pub edges_observed: u64,
    pub valid_edges_sent: u64,
    pub largest_received: u64,
    pub last_sent: MeasurementRecord,
}

/// Minimal connection host for the latency spin measurement.
///
/// Owns the measurement state together with the output queues whose
/// contents decide the blocking bit, and timestamps everything with `C`.
#[derive(Debug)]
pub struct Connection<C: MonotonicClock> {
    clock: C,
    measurement: MeasurementState,
    queues: OutputQueues,
    stats: MeasurementSnapshot,
}

impl<C: MonotonicClock> Connection<C> {
    pub fn new(role: Role, clock: C) -> Self {
        Self {
            clock,
            measurement: MeasurementState::new(role),
            queues: OutputQueues::default(),
            stats: MeasurementSnapshot {
                role,
                packets_accepted: 0,
                packets_reordered: 0,
                packets_sent: 0,
                edges_observed: 0,
                valid_edges_sent: 0,
                largest_received: 0,
                last_sent: MeasurementRecord::default(),
            },
        }
    }

    pub fn handle_incoming(&mut self, header: &PacketHeader) -> ReceiveOutcome {
        let outcome = self.measurement.on_receive(
            header.packet_number,
            header.measurement,
            self.clock.now(),
        );

        match outcome {
            ReceiveOutcome::Reordered => self.stats.packets_reordered += 1,
            ReceiveOutcome::Accepted => self.stats.packets_accepted += 1,
            ReceiveOutcome::Edge => {
                self.stats.packets_accepted += 1;
                self.stats.edges_observed += 1;
            }
        }
        self.stats.largest_received = self.measurement.largest_received();

        outcome
    }

    /// Measurement byte for the packet that is about to be sent
    pub fn next_measurement(&mut self) -> MeasurementField {
        let empty = !self.queues.has_pending_frames();
        let field = self.measurement.on_send(empty, self.clock.now());
        let record = field.decode();

        self.stats.packets_sent += 1;
        self.stats.last_sent = record;
        if record.latency_valid {
            self.stats.valid_edges_sent += 1;
            trace!(spin = record.spin.to_bits(), "sending valid spin edge");
        }
        if record.blocking {
            trace!("no application data pending, marking packet as blocking");
        }

        field
    }

    pub fn queues_mut(&mut self) -> &mut OutputQueues {
        &mut self.queues
    }

    pub fn measurement(&self) -> &MeasurementState {
        &self.measurement
    }

    pub fn snapshot(&self) -> MeasurementSnapshot {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{clock::ManualClock, measurement::SpinValue};

    fn header(packet_number: u64, spin: u8) -> PacketHeader {
        PacketHeader {
            packet_number,
            measurement: MeasurementRecord {
                spin: SpinValue::new(spin).unwrap(),
                ..Default::default()
            }
            .encode(),
        }
    }

    #[test]
    fn test_pending_frames() {
        let mut queues = OutputQueues::default();
        assert!(!queues.has_pending_frames());

        queues.queue_protected(Frame::new(vec![1, 2, 3]));
        assert!(queues.has_pending_frames());

        let taken = queues.take_pending();
        assert_eq!(taken.len(), 1);
        assert!(!taken[0].needs_transmit);
        assert!(!queues.has_pending_frames());

        queues.queue_cleartext(Frame {
            payload: vec![],
            needs_transmit: false,
        });
        assert!(!queues.has_pending_frames());
        queues.queue_cleartext(Frame::new(vec![4]));
        assert!(queues.has_pending_frames());
        assert_eq!(
            queues.take_pending(),
            vec![Frame {
                payload: vec![4],
                needs_transmit: false,
            }]
        );
    }

    #[test]
    fn test_blocking_follows_queues() {
        let mut connection = Connection::new(Role::Client, ManualClock::default());

        assert!(connection.next_measurement().decode().blocking);

        connection.queues_mut().queue_cleartext(Frame::new(vec![0]));
        assert!(!connection.next_measurement().decode().blocking);
        connection.queues_mut().take_pending();

        connection.queues_mut().queue_protected(Frame::new(vec![0]));
        assert!(!connection.next_measurement().decode().blocking);
        connection.queues_mut().take_pending();

        assert!(connection.next_measurement().decode().blocking);
    }

    #[test]
    fn test_edge_timing_uses_clock() {
        let clock = ManualClock::default();
        let mut connection = Connection::new(Role::Server, clock.clone());

        connection.handle_incoming(&header(1, 0));
        connection.next_measurement();

        assert_eq!(connection.handle_incoming(&header(2, 1)), ReceiveOutcome::Edge);
        clock.advance(Duration::from_micros(300));
        assert!(connection.next_measurement().decode().latency_valid);

        assert_eq!(connection.handle_incoming(&header(3, 0)), ReceiveOutcome::Edge);
        clock.advance(Duration::from_millis(2));
        assert!(!connection.next_measurement().decode().latency_valid);
    }

    #[test]
    fn test_snapshot_counters() {
        let mut connection = Connection::new(Role::Client, ManualClock::default());

        connection.handle_incoming(&header(1, 0));
        connection.next_measurement();
        connection.handle_incoming(&header(3, 1));
        connection.handle_incoming(&header(2, 0));
        connection.next_measurement();

        let snapshot = connection.snapshot();
        assert_eq!(snapshot.role, Role::Client);
        assert_eq!(snapshot.packets_accepted, 2);
        assert_eq!(snapshot.packets_reordered, 1);
        assert_eq!(snapshot.packets_sent, 2);
        assert_eq!(snapshot.edges_observed, 1);
        assert_eq!(snapshot.valid_edges_sent, 1);
        assert_eq!(snapshot.largest_received, 3);
        assert_eq!(
            snapshot.last_sent,
            MeasurementRecord {
                spin: SpinValue::new(2).unwrap(),
                latency_valid: true,
                blocking: true,
            }
        );
        assert_eq!(connection.measurement().role(), Role::Client);
    }
}
