//! Latency spin measurement for QUIC-like transports.
//!
//! Every packet carries one measurement byte holding a two bit spin value
//! together with a latency-valid and a blocking flag. The client advances the
//! spin value it last received, the server reflects it, so that an on-path
//! observer can time the resulting edges and derive the round trip time.
//!
//! This crate does no IO: callers hand in received headers and ask for the
//! byte to put in the next packet.
#![forbid(unsafe_code)]

mod clock;
mod connection;
mod measurement;
mod time_types;

#[cfg(any(test, feature = "__internal-test"))]
pub use clock::ManualClock;
pub use clock::{MonotonicClock, StdMonotonicClock};
pub use connection::{Connection, Frame, MeasurementSnapshot, OutputQueues, PacketHeader};
pub use measurement::{
    InvalidSpinValue, MeasurementField, MeasurementRecord, MeasurementState, ReceiveOutcome, Role,
    SpinValue,
};
pub use time_types::{MeasurementInstant, EDGE_VALIDITY_THRESHOLD};
