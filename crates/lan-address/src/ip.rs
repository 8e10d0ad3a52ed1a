use std::fmt;
use std::str::FromStr;

/// A 4-byte IPv4 address. Only the bits this crate needs are implemented:
/// parsing and printing the canonical dotted-decimal form, and raw byte
/// access for embedding in an ARP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Ipv4Address(pub [u8; 4]);

impl Ipv4Address {
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<[u8; 4]> for Ipv4Address {
    fn from(bytes: [u8; 4]) -> Self {
        Ipv4Address(bytes)
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseIpError {
    #[error("IP address must have exactly 4 octets")]
    WrongOctetCount,
    #[error("octet must have between 1 and 3 digits")]
    OctetLength,
    #[error("octet contains a non-digit character")]
    NonDigit,
    #[error("octet value exceeds 255")]
    OctetOverflow,
    #[error("leading zeros are not allowed in a multi-digit octet")]
    LeadingZero,
}

impl FromStr for Ipv4Address {
    type Err = ParseIpError;

    /// Hand-rolled rather than delegating to a general parser: the grammar
    /// required here is stricter than `std::net::Ipv4Addr`'s (no leading
    /// zeros, no hex/octal octets) and is walked character by character to
    /// match it exactly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ip = [0u8; 4];
        let mut octet_index = 0usize;
        let mut current_octet = 0usize;
        let mut octet_value: u32 = 0;

        for ch in s.chars() {
            if ch == '.' {
                if current_octet >= 3 {
                    return Err(ParseIpError::WrongOctetCount);
                }
                if !(1..=3).contains(&octet_index) {
                    return Err(ParseIpError::OctetLength);
                }
                ip[current_octet] = octet_value as u8;
                current_octet += 1;
                octet_value = 0;
                octet_index = 0;
                continue;
            }

            if !ch.is_ascii_digit() {
                return Err(ParseIpError::NonDigit);
            }

            if octet_index == 1 && octet_value == 0 {
                return Err(ParseIpError::LeadingZero);
            }

            octet_value = octet_value * 10 + ch.to_digit(10).unwrap();
            octet_index += 1;

            if octet_value > 255 {
                return Err(ParseIpError::OctetOverflow);
            }
            if octet_index > 3 {
                return Err(ParseIpError::OctetLength);
            }
        }

        if current_octet != 3 {
            return Err(ParseIpError::WrongOctetCount);
        }
        if octet_index < 1 {
            return Err(ParseIpError::OctetLength);
        }
        ip[current_octet] = octet_value as u8;

        Ok(Ipv4Address(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_valid_addresses() {
        for s in ["0.0.0.0", "255.255.255.255", "10.0.0.1", "192.168.1.42"] {
            let parsed: Ipv4Address = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }

    #[test]
    fn rejects_leading_zero() {
        assert_eq!(
            "10.0.01.1".parse::<Ipv4Address>(),
            Err(ParseIpError::LeadingZero)
        );
        assert_eq!(
            "010.0.0.1".parse::<Ipv4Address>(),
            Err(ParseIpError::LeadingZero)
        );
    }

    #[test]
    fn allows_bare_zero_octet() {
        assert!("0.0.0.0".parse::<Ipv4Address>().is_ok());
    }

    #[test]
    fn rejects_too_many_digits() {
        assert_eq!(
            "1000.0.0.1".parse::<Ipv4Address>(),
            Err(ParseIpError::OctetLength)
        );
    }

    #[test]
    fn rejects_overflowing_octet() {
        assert_eq!(
            "256.0.0.1".parse::<Ipv4Address>(),
            Err(ParseIpError::OctetOverflow)
        );
    }

    #[test]
    fn rejects_wrong_octet_count() {
        assert_eq!(
            "10.0.1".parse::<Ipv4Address>(),
            Err(ParseIpError::WrongOctetCount)
        );
        assert_eq!(
            "10.0.0.0.1".parse::<Ipv4Address>(),
            Err(ParseIpError::WrongOctetCount)
        );
    }

    #[test]
    fn rejects_empty_octet() {
        assert_eq!(
            "10..0.1".parse::<Ipv4Address>(),
            Err(ParseIpError::OctetLength)
        );
    }

    #[test]
    fn rejects_non_digit() {
        assert_eq!(
            "10.0.a.1".parse::<Ipv4Address>(),
            Err(ParseIpError::NonDigit)
        );
    }
}
