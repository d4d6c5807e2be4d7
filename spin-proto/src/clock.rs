use crate::time_types::MeasurementInstant;

/// Monotonic time source used to timestamp spin edges.
///
/// This is a trait so that connections can be driven by a clock that is
/// under the control of the caller, e.g. for replaying packet traces.
pub trait MonotonicClock {
    fn now(&self) -> MeasurementInstant;
}

/// Clock backed by [`std::time::Instant`].
#[derive(Debug, Default, Copy, Clone)]
pub struct StdMonotonicClock;

impl MonotonicClock for StdMonotonicClock {
    fn now(&self) -> MeasurementInstant {
        MeasurementInstant::now()
    }
}

#[cfg(any(test, feature = "__internal-test"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "__internal-test"))]
mod manual {
    use std::{cell::Cell, rc::Rc, time::Duration};

    use super::MonotonicClock;
    use crate::time_types::MeasurementInstant;

    /// Clock that only moves when told to. Clones share the same time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        now: Rc<Cell<MeasurementInstant>>,
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self {
                now: Rc::new(Cell::new(MeasurementInstant::now())),
            }
        }
    }

    impl ManualClock {
        pub fn advance(&self, duration: Duration) {
            self.now.set(self.now.get() + duration);
        }
    }

    impl MonotonicClock for ManualClock {
        fn now(&self) -> MeasurementInstant {
            self.now.get()
        }
    }
}
