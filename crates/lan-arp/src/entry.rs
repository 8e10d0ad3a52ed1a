use std::time::Instant;

use lan_address::MacAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Reachable,
    Pending,
    Stale,
    Failed,
}

/// One row of the ARP table. The pending-wait signal is deliberately *not*
/// part of this struct — the reference implementation kept a wait channel
/// both here and in a separate module-level map, and could let them drift
/// out of sync. This crate keeps exactly one copy, in the module's pending
/// map, created on the transition into `Pending` and removed on any
/// transition out of it (see `ArpModule`'s `close_pending_locked`).
#[derive(Debug, Clone)]
pub struct ArpEntry {
    pub mac: MacAddress,
    pub state: EntryState,
    pub last_used: Instant,
    pub last_updated: Instant,
    pub last_attempted: Instant,
}

impl ArpEntry {
    pub fn new(mac: MacAddress, state: EntryState) -> ArpEntry {
        let now = Instant::now();
        ArpEntry {
            mac,
            state,
            last_used: now,
            last_updated: now,
            last_attempted: now,
        }
    }
}
