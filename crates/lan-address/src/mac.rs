use std::fmt;
use std::str::FromStr;

/// A 6-byte Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    pub const ZERO: MacAddress = MacAddress([0; 6]);

    /// Synthesizes a locally-administered, unicast MAC of the form
    /// `02:00:?:?:?:?`, encoding `pid` in the low 4 bytes. The leading
    /// octet's low two bits (multicast / locally-administered) identify
    /// this address as never colliding with a real vendor-assigned MAC.
    pub fn from_process_id(pid: u32) -> MacAddress {
        let pid = pid.to_be_bytes();
        MacAddress([0x02, 0x00, pid[0], pid[1], pid[2], pid[3]])
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid MAC address: {0}")]
pub struct ParseMacError(String);

impl FromStr for MacAddress {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.split(|c| c == ':' || c == '-').collect();
        if octets.len() != 6 {
            return Err(ParseMacError(format!(
                "expected 6 colon- or hyphen-separated octets, got {}",
                octets.len()
            )));
        }
        let mut bytes = [0u8; 6];
        for (i, octet) in octets.iter().enumerate() {
            if octet.len() != 2 {
                return Err(ParseMacError(format!("octet {i} is not two hex digits")));
            }
            bytes[i] = u8::from_str_radix(octet, 16)
                .map_err(|_| ParseMacError(format!("octet {i} is not valid hex")))?;
        }
        Ok(MacAddress(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_is_all_ones() {
        assert_eq!(MacAddress::BROADCAST.0, [0xFF; 6]);
        assert!(MacAddress::BROADCAST.is_broadcast());
    }

    #[test]
    fn from_process_id_sets_locally_administered_octet() {
        let mac = MacAddress::from_process_id(0x1234_5678);
        assert_eq!(mac.0[0], 0x02);
        assert_eq!(mac.0[1], 0x00);
        assert_eq!(&mac.0[2..], &[0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let mac = MacAddress([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        let printed = mac.to_string();
        assert_eq!(printed, "de:ad:be:ef:00:01");
        assert_eq!(printed.parse::<MacAddress>().unwrap(), mac);
    }

    #[test]
    fn parse_accepts_hyphens_and_uppercase() {
        let mac: MacAddress = "DE-AD-BE-EF-00-01".parse().unwrap();
        assert_eq!(mac.0, [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
    }

    #[test]
    fn parse_rejects_wrong_octet_count() {
        assert!("00:11:22:33:44".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44:55:66".parse::<MacAddress>().is_err());
    }

    #[test]
    fn parse_rejects_non_hex_octet() {
        assert!("zz:11:22:33:44:55".parse::<MacAddress>().is_err());
    }
}
