//! Probe datagrams exchanged between two spind endpoints.
//!
//! Layout: an 8 byte big endian packet number, the measurement byte, then an
//! opaque payload that only exists to give the probe some size.

use std::fmt::Display;

use spin_proto::{MeasurementField, PacketHeader};

const HEADER_LENGTH: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeDatagram<'a> {
    pub header: PacketHeader,
    pub payload: &'a [u8],
}

impl<'a> ProbeDatagram<'a> {
    pub fn deserialize(data: &'a [u8]) -> Result<Self, DatagramError> {
        if data.len() < HEADER_LENGTH {
            return Err(DatagramError::TooShort(data.len()));
        }

        let mut packet_number = [0; 8];
        packet_number.copy_from_slice(&data[0..8]);

        Ok(ProbeDatagram {
            header: PacketHeader {
                packet_number: u64::from_be_bytes(packet_number),
                measurement: MeasurementField::from_byte(data[8]),
            },
            payload: &data[HEADER_LENGTH..],
        })
    }

    pub fn serialize(&self, buf: &mut Vec<u8>) {
        buf.clear();
        buf.reserve(HEADER_LENGTH + self.payload.len());
        buf.extend_from_slice(&self.header.packet_number.to_be_bytes());
        buf.push(self.header.measurement.to_byte());
        buf.extend_from_slice(self.payload);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatagramError {
    TooShort(usize),
}

impl Display for DatagramError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort(len) => write!(
                f,
                "datagram of {len} bytes is shorter than the {HEADER_LENGTH} byte probe header"
            ),
        }
    }
}

impl std::error::Error for DatagramError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let datagram = ProbeDatagram {
            header: PacketHeader {
                packet_number: 0x0102030405060708,
                measurement: MeasurementField::from_byte(0xB0),
            },
            payload: b"abc",
        };

        let mut buf = vec![0xFF; 4];
        datagram.serialize(&mut buf);
        assert_eq!(
            buf,
            [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0xB0, b'a', b'b', b'c']
        );

        assert_eq!(ProbeDatagram::deserialize(&buf).unwrap(), datagram);
    }

    #[test]
    fn test_empty_payload() {
        let buf = [0, 0, 0, 0, 0, 0, 0, 42, 0x40];
        let datagram = ProbeDatagram::deserialize(&buf).unwrap();
        assert_eq!(datagram.header.packet_number, 42);
        assert_eq!(datagram.header.measurement.to_byte(), 0x40);
        assert!(datagram.payload.is_empty());
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            ProbeDatagram::deserialize(&[0; 8]),
            Err(DatagramError::TooShort(8))
        );
        assert_eq!(
            ProbeDatagram::deserialize(&[]),
            Err(DatagramError::TooShort(0))
        );
    }
}
