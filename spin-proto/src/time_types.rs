use std::time::{Duration, Instant};

/// Maximum delay between observing a spin edge and sending the reflecting
/// packet for that packet to still be marked as a valid latency sample.
pub const EDGE_VALIDITY_THRESHOLD: Duration = Duration::from_millis(1);

/// MeasurementInstant is a monotonically increasing value modelling the uptime
/// of the connection. It is used to timestamp spin edges.
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord)]
pub struct MeasurementInstant {
    instant: Instant,
}

impl MeasurementInstant {
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
        }
    }

    /// Time elapsed between `earlier` and `self`, or `None` when `earlier`
    /// actually lies after `self`.
    pub fn checked_duration_since(self, earlier: Self) -> Option<Duration> {
        self.instant.checked_duration_since(earlier.instant)
    }
}

impl std::ops::Add<Duration> for MeasurementInstant {
    type Output = MeasurementInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        MeasurementInstant {
            instant: self.instant + rhs,
        }
    }
}
