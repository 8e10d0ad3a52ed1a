//! The router's learning switch: a MAC-address table mapping each
//! observed source address to the connection it arrived on, used to
//! unicast-forward, broadcast-flood, or silently drop incoming frames.
//!
//! The table never hands out a `Connection` it still owns: every lookup
//! returns `try_clone`d handles, so forwarding writes happen after the
//! lock is released and never block a concurrent learn/forget.

use std::collections::HashMap;
use std::sync::Mutex;

use lan_address::MacAddress;
use lan_transport::{Connection, TransportError};

pub struct Switch {
    table: Mutex<HashMap<MacAddress, Connection>>,
}

/// What a received frame's destination MAC resolves to.
pub enum Route {
    /// Forward to exactly this one learned connection.
    Unicast(Connection),
    /// Flood to every other learned connection (the source's own entry,
    /// if present, is already excluded).
    Broadcast(Vec<(MacAddress, Connection)>),
    /// Destination MAC has never been seen; the frame should be dropped.
    Unknown,
}

impl Switch {
    pub fn new() -> Switch {
        Switch {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Records (or refreshes) which connection a source MAC arrives on.
    /// `conn` should be an owned clone of the per-peer connection handle;
    /// the table keeps it for forwarding writes only.
    pub fn learn(&self, mac: MacAddress, conn: Connection) {
        self.table.lock().unwrap().insert(mac, conn);
        tracing::debug!(%mac, "MAC table updated");
    }

    pub fn forget(&self, mac: MacAddress) {
        self.table.lock().unwrap().remove(&mac);
        tracing::debug!(%mac, "MAC table entry removed");
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves where a frame from `src` addressed to `dst` should go.
    /// `try_clone` failures (the peer's socket is already broken) surface
    /// as an error per target rather than aborting the whole resolution.
    pub fn route(&self, src: MacAddress, dst: MacAddress) -> Result<Route, TransportError> {
        let table = self.table.lock().unwrap();

        if dst.is_broadcast() {
            let mut targets = Vec::new();
            for (mac, conn) in table.iter() {
                if *mac == src {
                    continue;
                }
                targets.push((*mac, conn.try_clone()?));
            }
            return Ok(Route::Broadcast(targets));
        }

        match table.get(&dst) {
            Some(conn) => Ok(Route::Unicast(conn.try_clone()?)),
            None => Ok(Route::Unknown),
        }
    }
}

impl Default for Switch {
    fn default() -> Switch {
        Switch::new()
    }
}
