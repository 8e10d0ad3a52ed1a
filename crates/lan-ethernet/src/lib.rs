//! Ethernet frame layout, serialization, and the frame check sequence.
//!
//! A frame on this wire is `dst(6) ‖ src(6) ‖ etherType(2) ‖ payload(..) ‖
//! fcs(4)`, all big-endian, with the payload zero-padded so the whole frame
//! never falls below [`MIN_FRAME`] bytes and never exceeds [`MTU`].

use lan_address::MacAddress;

/// Maximum frame size, larger than real Ethernet by design so it can carry
/// a full interactive prompt payload.
pub const MTU: usize = 5018;

/// Header (12 bytes of addresses + 2 of EtherType) plus the 4-byte FCS.
pub const FRAME_OVERHEAD: usize = 18;

/// Smallest legal frame, payload included.
pub const MIN_FRAME: usize = 46;

/// Largest payload `NewFrame` will accept.
pub const MAX_PAYLOAD: usize = MTU - FRAME_OVERHEAD;

/// Smallest legal payload once padding is applied.
pub const MIN_PAYLOAD: usize = MIN_FRAME - FRAME_OVERHEAD;

pub const ARP_ETHER_TYPE: u16 = 0x0806;
pub const IPV4_ETHER_TYPE: u16 = 0x0800;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EthernetError {
    #[error("payload of {0} bytes exceeds the maximum of {MAX_PAYLOAD}")]
    PayloadTooLarge(usize),
    #[error("frame of {0} bytes is outside the valid range [{MIN_FRAME}, {MTU}]")]
    InvalidFrameSize(usize),
    #[error("frame check sequence did not match")]
    BadFcs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub dst_mac: MacAddress,
    pub src_mac: MacAddress,
    pub ether_type: u16,
    pub payload: Vec<u8>,
    pub fcs: u32,
}

impl Frame {
    /// Builds a frame, padding `payload` on the right with zeros up to
    /// [`MIN_PAYLOAD`] when it is shorter. `fcs` is left at zero; it is
    /// only meaningful after [`Frame::serialize`] or [`Frame::deserialize`].
    pub fn new(
        src_mac: MacAddress,
        dst_mac: MacAddress,
        ether_type: u16,
        payload: &[u8],
    ) -> Result<Frame, EthernetError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(EthernetError::PayloadTooLarge(payload.len()));
        }
        let mut padded = payload.to_vec();
        if padded.len() < MIN_PAYLOAD {
            padded.resize(MIN_PAYLOAD, 0);
        }
        Ok(Frame {
            dst_mac,
            src_mac,
            ether_type,
            payload: padded,
            fcs: 0,
        })
    }

    /// Serializes the frame and records the computed FCS on `self`, the
    /// same way the reference implementation's pointer-receiver method
    /// leaves the trailer it just wrote visible on the struct.
    pub fn serialize(&mut self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_OVERHEAD + self.payload.len());
        buf.extend_from_slice(self.dst_mac.as_bytes());
        buf.extend_from_slice(self.src_mac.as_bytes());
        buf.extend_from_slice(&self.ether_type.to_be_bytes());
        buf.extend_from_slice(&self.payload);

        let fcs = crc32(&buf);
        self.fcs = fcs;
        buf.extend_from_slice(&fcs.to_be_bytes());
        buf
    }

    pub fn deserialize(data: &[u8]) -> Result<Frame, EthernetError> {
        if data.len() < MIN_FRAME || data.len() > MTU {
            return Err(EthernetError::InvalidFrameSize(data.len()));
        }

        let prefix = &data[..data.len() - 4];
        let wire_fcs = u32::from_be_bytes(data[data.len() - 4..].try_into().unwrap());
        let computed_fcs = crc32(prefix);
        if computed_fcs != wire_fcs {
            return Err(EthernetError::BadFcs);
        }

        let dst_mac = MacAddress(data[0..6].try_into().unwrap());
        let src_mac = MacAddress(data[6..12].try_into().unwrap());
        let ether_type = u16::from_be_bytes(data[12..14].try_into().unwrap());
        let payload = data[14..data.len() - 4].to_vec();

        Ok(Frame {
            dst_mac,
            src_mac,
            ether_type,
            payload,
            fcs: wire_fcs,
        })
    }
}

/// IEEE 802.3 CRC-32: reflected polynomial 0xEDB88320, init/xorout
/// 0xFFFFFFFF, reflected input and output. `crc32fast` implements exactly
/// this variant (it is the same algorithm zlib/zip use), so there is no
/// reason to hand-roll the bit-twiddling table here.
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}
