use serde::{Deserialize, Serialize};

mod state;

pub use state::{MeasurementState, ReceiveOutcome, Role};

// Layout of the measurement byte. Bits 0-3 are reserved and always sent as zero.
const SPIN_MASK: u8 = 0xC0;
const SPIN_SHIFT: u8 = 6;
const LATENCY_VALID_BIT: u8 = 0x20;
const BLOCKING_BIT: u8 = 0x10;

/// Two bit latency spin counter
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SpinValue(u8);

impl SpinValue {
    pub const ZERO: SpinValue = SpinValue(0);

    /// Returns `None` for values that do not fit in two bits
    pub const fn new(value: u8) -> Option<SpinValue> {
        if value <= 3 {
            Some(SpinValue(value))
        } else {
            None
        }
    }

    // Only the two least significant bits are used
    const fn from_bits(bits: u8) -> SpinValue {
        SpinValue(bits & 0b11)
    }

    pub const fn to_bits(self) -> u8 {
        self.0
    }

    /// The spin value one step further, wrapping around after 3
    pub const fn next(self) -> SpinValue {
        SpinValue::from_bits(self.0.wrapping_add(1))
    }
}

impl TryFrom<u8> for SpinValue {
    type Error = InvalidSpinValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SpinValue::new(value).ok_or(InvalidSpinValue(value))
    }
}

impl From<SpinValue> for u8 {
    fn from(value: SpinValue) -> Self {
        value.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InvalidSpinValue(pub u8);

impl std::fmt::Display for InvalidSpinValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "spin value {} does not fit in two bits", self.0)
    }
}

impl std::error::Error for InvalidSpinValue {}

/// Decoded contents of the measurement byte
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub spin: SpinValue,
    pub latency_valid: bool,
    pub blocking: bool,
}

impl MeasurementRecord {
    pub fn encode(&self) -> MeasurementField {
        let mut bits = self.spin.to_bits() << SPIN_SHIFT;

        if self.latency_valid {
            bits |= LATENCY_VALID_BIT;
        }

        if self.blocking {
            bits |= BLOCKING_BIT;
        }

        MeasurementField(bits)
    }
}

/// The measurement byte as it is carried in a packet header
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MeasurementField(u8);

impl MeasurementField {
    pub const fn from_byte(byte: u8) -> MeasurementField {
        MeasurementField(byte)
    }

    pub const fn to_byte(self) -> u8 {
        self.0
    }

    pub fn decode(self) -> MeasurementRecord {
        MeasurementRecord {
            spin: SpinValue::from_bits((self.0 & SPIN_MASK) >> SPIN_SHIFT),
            latency_valid: self.0 & LATENCY_VALID_BIT != 0,
            blocking: self.0 & BLOCKING_BIT != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{thread_rng, Rng};

    use super::*;

    fn all_records() -> impl Iterator<Item = MeasurementRecord> {
        (0..4u8).flat_map(|spin| {
            [(false, false), (false, true), (true, false), (true, true)]
                .into_iter()
                .map(move |(latency_valid, blocking)| MeasurementRecord {
                    spin: SpinValue::new(spin).unwrap(),
                    latency_valid,
                    blocking,
                })
        })
    }

    #[test]
    fn test_bit_positions() {
        let spin_only = MeasurementRecord {
            spin: SpinValue::new(3).unwrap(),
            ..Default::default()
        };
        assert_eq!(spin_only.encode().to_byte(), 0b1100_0000);

        let spin_low = MeasurementRecord {
            spin: SpinValue::new(1).unwrap(),
            ..Default::default()
        };
        assert_eq!(spin_low.encode().to_byte(), 0b0100_0000);

        let valid = MeasurementRecord {
            latency_valid: true,
            ..Default::default()
        };
        assert_eq!(valid.encode().to_byte(), 0b0010_0000);

        let blocking = MeasurementRecord {
            blocking: true,
            ..Default::default()
        };
        assert_eq!(blocking.encode().to_byte(), 0b0001_0000);

        assert_eq!(MeasurementRecord::default().encode().to_byte(), 0);
    }

    #[test]
    fn test_encode_stays_in_upper_nibble() {
        for record in all_records() {
            assert_eq!(record.encode().to_byte() & 0x0F, 0, "{record:?}");
        }
    }

    #[test]
    fn test_roundtrip() {
        for record in all_records() {
            assert_eq!(record.encode().decode(), record);
        }
    }

    #[test]
    fn test_decode_ignores_reserved_bits() {
        let record = MeasurementField::from_byte(0b1010_1111).decode();
        assert_eq!(
            record,
            MeasurementRecord {
                spin: SpinValue::new(2).unwrap(),
                latency_valid: true,
                blocking: false,
            }
        );

        let mut rng = thread_rng();
        for _ in 0..256 {
            let byte: u8 = rng.gen();
            let reencoded = MeasurementField::from_byte(byte).decode().encode();
            assert_eq!(reencoded.to_byte(), byte & 0xF0);
        }
    }

    #[test]
    fn test_spin_value() {
        assert_eq!(SpinValue::new(4), None);
        assert_eq!(SpinValue::try_from(7u8), Err(InvalidSpinValue(7)));
        assert_eq!(SpinValue::new(0).unwrap().next(), SpinValue::new(1).unwrap());
        assert_eq!(SpinValue::new(3).unwrap().next(), SpinValue::ZERO);
    }

    #[test]
    fn test_record_serialization() {
        let record = MeasurementRecord {
            spin: SpinValue::new(2).unwrap(),
            latency_valid: true,
            blocking: false,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"spin":2,"latency_valid":true,"blocking":false}"#);

        let err = serde_json::from_str::<MeasurementRecord>(
            r#"{"spin":5,"latency_valid":true,"blocking":false}"#,
        );
        assert!(err.is_err());
    }
}
