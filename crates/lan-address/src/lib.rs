//! Value types for the two address families this crate speaks: Ethernet MAC
//! addresses and dotted-decimal IPv4 addresses. Both are plain 6/4-byte
//! values with no behavior beyond parsing, printing, and equality.

pub mod ip;
pub mod mac;

pub use ip::{Ipv4Address, ParseIpError};
pub use mac::{MacAddress, ParseMacError};
