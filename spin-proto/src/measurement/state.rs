use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{MeasurementField, MeasurementRecord, SpinValue};
use crate::time_types::{MeasurementInstant, EDGE_VALIDITY_THRESHOLD};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Server,
}

impl Role {
    fn spin_policy(self) -> SpinPolicy {
        match self {
            // The client drives the signal, always one step ahead of what it saw last
            Role::Client => SpinPolicy {
                role: self,
                reflect: SpinValue::next,
            },
            // The server reflects the signal back unchanged
            Role::Server => SpinPolicy {
                role: self,
                reflect: std::convert::identity,
            },
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Server => f.write_str("server"),
        }
    }
}

/// Spin transform for one role, resolved once when the state is created.
#[derive(Copy, Clone)]
struct SpinPolicy {
    role: Role,
    reflect: fn(SpinValue) -> SpinValue,
}

impl std::fmt::Debug for SpinPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SpinPolicy").field(&self.role).finish()
    }
}

/// What happened to a received packet's measurement byte
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Packet number not larger than every earlier one, state untouched
    Reordered,
    Accepted,
    /// Accepted, and its spin differs from the previous packet
    Edge,
}

/// Per-connection latency spin state.
///
/// Fed with every accepted inbound packet through [`on_receive`](Self::on_receive)
/// and queried for every outbound packet through [`on_send`](Self::on_send).
#[derive(Debug)]
pub struct MeasurementState {
    policy: SpinPolicy,
    // What goes out with the next packet. Only the spin is kept here between
    // sends, the flags are computed at send time.
    outgoing: MeasurementRecord,
    // Largest packet number processed so far, used to drop reordered packets.
    // Starts at zero, so packet number 0 is never processed.
    largest_received: u64,
    last_received_spin: Option<SpinValue>,
    edge_observed_at: Option<MeasurementInstant>,
    // Set for exactly the one outbound packet following a spin edge
    edge_pending: bool,
}

impl MeasurementState {
    pub fn new(role: Role) -> Self {
        Self {
            policy: role.spin_policy(),
            outgoing: MeasurementRecord::default(),
            largest_received: 0,
            last_received_spin: None,
            edge_observed_at: None,
            edge_pending: false,
        }
    }

    /// Process the measurement byte of a received packet.
    ///
    /// Packets that do not carry a packet number larger than every previously
    /// processed one are ignored.
    pub fn on_receive(
        &mut self,
        packet_number: u64,
        field: MeasurementField,
        now: MeasurementInstant,
    ) -> ReceiveOutcome {
        if packet_number <= self.largest_received {
            debug!(
                packet_number,
                largest_received = self.largest_received,
                "ignoring reordered packet"
            );
            return ReceiveOutcome::Reordered;
        }
        self.largest_received = packet_number;

        let received = field.decode();

        let mut outcome = ReceiveOutcome::Accepted;
        if matches!(self.last_received_spin, Some(last) if last != received.spin) {
            trace!(packet_number, spin = received.spin.to_bits(), "spin edge");
            self.edge_observed_at = Some(now);
            self.edge_pending = true;
            outcome = ReceiveOutcome::Edge;
        }

        self.outgoing.spin = (self.policy.reflect)(received.spin);
        self.last_received_spin = Some(received.spin);

        outcome
    }

    /// Produce the measurement byte for the next outbound packet.
    ///
    /// `output_queues_empty` tells whether the connection currently has no
    /// frames waiting for transmission.
    pub fn on_send(
        &mut self,
        output_queues_empty: bool,
        now: MeasurementInstant,
    ) -> MeasurementField {
        self.outgoing.latency_valid = self.edge_pending
            && self
                .edge_observed_at
                .and_then(|observed| now.checked_duration_since(observed))
                .is_some_and(|elapsed| elapsed <= EDGE_VALIDITY_THRESHOLD);
        self.edge_pending = false;

        self.outgoing.blocking = output_queues_empty;

        self.outgoing.encode()
    }

    pub fn role(&self) -> Role {
        self.policy.role
    }

    /// The record sent with the most recent packet, or the spin that will be
    /// sent with the next one when nothing was sent since the last receive.
    pub fn outgoing(&self) -> MeasurementRecord {
        self.outgoing
    }

    pub fn largest_received(&self) -> u64 {
        self.largest_received
    }

    pub fn last_received_spin(&self) -> Option<SpinValue> {
        self.last_received_spin
    }

    pub fn edge_pending(&self) -> bool {
        self.edge_pending
    }
}
