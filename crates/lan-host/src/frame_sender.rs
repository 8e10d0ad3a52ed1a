use std::sync::{Arc, Mutex};

use lan_address::MacAddress;
use lan_arp::{FrameSender, SendFrameError};
use lan_ethernet::Frame;
use lan_transport::Connection;

/// Bridges [`lan_arp::FrameSender`] to a real transport connection: frames
/// the message as Ethernet and writes it length-prefixed over TCP. Cheap
/// to clone — clones share one underlying connection behind a mutex, so
/// the ARP module's own traffic and the operator's payload sends never
/// interleave a half-written frame.
#[derive(Clone)]
pub struct TransportFrameSender {
    conn: Arc<Mutex<Connection>>,
    own_mac: MacAddress,
}

impl TransportFrameSender {
    pub fn new(conn: Connection, own_mac: MacAddress) -> TransportFrameSender {
        TransportFrameSender {
            conn: Arc::new(Mutex::new(conn)),
            own_mac,
        }
    }
}

impl FrameSender for TransportFrameSender {
    fn send_to_mac(
        &self,
        message: &[u8],
        dst_mac: MacAddress,
        ether_type: u16,
    ) -> Result<(), SendFrameError> {
        let mut frame = Frame::new(self.own_mac, dst_mac, ether_type, message)
            .map_err(|err| SendFrameError(err.to_string()))?;
        let wire = frame.serialize();
        self.conn
            .lock()
            .unwrap()
            .send(&wire)
            .map_err(|err| SendFrameError(err.to_string()))
    }
}
