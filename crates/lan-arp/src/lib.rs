//! The ARP module: per-IP MAC resolution with a bounded retry/negative-cache
//! protocol, gratuitous-ARP conflict detection and defense, and background
//! garbage collection of stale/dead entries.
//!
//! An [`ArpModule`] is a cheap `Clone` handle (an `Arc` around the shared
//! table and mutex) so it can be handed to a spawned conflict-verification
//! thread or a background GC thread without the caller managing lifetimes.

mod entry;
mod wait;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use lan_address::{Ipv4Address, MacAddress};
use lan_arp_protocol::{ArpPacket, Operation};
use lan_ethernet::ARP_ETHER_TYPE;

pub use entry::{ArpEntry, EntryState};
pub use wait::Waiter;

pub const RETRY_ATTEMPTS: u32 = 3;
pub const RETRY_INTERVAL: Duration = Duration::from_millis(250);
pub const RESOLVE_TIMEOUT: Duration = Duration::from_millis(
    (RETRY_ATTEMPTS as u64) * (RETRY_INTERVAL.as_millis() as u64),
);
pub const MAX_DEFENSES: u32 = 3;
pub const DEFEND_INTERVAL: Duration = Duration::from_secs(10);
pub const GC_TICK: Duration = Duration::from_secs(60);
pub const TIME_TO_STALE: Duration = Duration::from_secs(30);
pub const TIME_TO_DELETE: Duration = Duration::from_secs(3 * 60);

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SendFrameError(pub String);

/// The capability an `ArpModule` needs from its host: the ability to frame
/// an ARP payload and hand it to the link layer addressed to a given MAC.
/// Implemented by the host binary's transport glue; kept as a trait here so
/// this crate never depends on sockets.
pub trait FrameSender: Send + Sync {
    fn send_to_mac(
        &self,
        message: &[u8],
        dst_mac: MacAddress,
        ether_type: u16,
    ) -> Result<(), SendFrameError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ArpError {
    #[error("host unreachable: no ARP response")]
    HostUnreachable,
    #[error("negative cache: recently failed, not retrying yet")]
    NegativeCache,
    #[error("IP address is already in use by another host")]
    IpConflict,
    #[error("maximum number of IP defenses reached")]
    MaxDefensesReached,
    #[error("failed to send ARP frame: {0}")]
    Send(#[from] SendFrameError),
}

struct Inner {
    table: HashMap<Ipv4Address, ArpEntry>,
    pending: HashMap<Ipv4Address, Arc<Waiter>>,
    defend_attempt: u32,
    last_defense: Instant,
}

struct Shared {
    own_mac: MacAddress,
    own_ip: Ipv4Address,
    sender: Box<dyn FrameSender>,
    inner: Mutex<Inner>,
}

#[derive(Clone)]
pub struct ArpModule(Arc<Shared>);

impl ArpModule {
    pub fn new(own_mac: MacAddress, own_ip: Ipv4Address, sender: Box<dyn FrameSender>) -> ArpModule {
        ArpModule(Arc::new(Shared {
            own_mac,
            own_ip,
            sender,
            inner: Mutex::new(Inner {
                table: HashMap::new(),
                pending: HashMap::new(),
                defend_attempt: 0,
                last_defense: Instant::now() - DEFEND_INTERVAL,
            }),
        }))
    }

    pub fn own_mac(&self) -> MacAddress {
        self.0.own_mac
    }

    pub fn own_ip(&self) -> Ipv4Address {
        self.0.own_ip
    }

    /// Snapshot of one table entry, for diagnostics and tests. Acquires the
    /// lock, per the crate-wide rule that there is no lock-free read path.
    pub fn lookup(&self, ip: Ipv4Address) -> Option<ArpEntry> {
        self.0.inner.lock().unwrap().table.get(&ip).cloned()
    }

    pub fn table_len(&self) -> usize {
        self.0.inner.lock().unwrap().table.len()
    }

    // ---- resolution -----------------------------------------------------

    pub fn resolve(&self, ip: Ipv4Address) -> Result<MacAddress, ArpError> {
        let snapshot = {
            let mut inner = self.0.inner.lock().unwrap();
            match inner.table.get_mut(&ip) {
                Some(entry) => {
                    entry.last_used = Instant::now();
                    Some((entry.state, entry.mac, entry.last_attempted))
                }
                None => None,
            }
        };

        match snapshot {
            None => {
                let waiter = self.send_request(ip, MacAddress::BROADCAST)?;
                self.await_response(ip, &waiter)
            }
            Some((EntryState::Reachable, mac, _)) | Some((EntryState::Stale, mac, _)) => Ok(mac),
            Some((EntryState::Pending, _, _)) => {
                let waiter = self.0.inner.lock().unwrap().pending.get(&ip).cloned();
                match waiter {
                    Some(waiter) => self.await_response(ip, &waiter),
                    None => Err(ArpError::HostUnreachable),
                }
            }
            Some((EntryState::Failed, _, last_attempted)) => {
                if last_attempted.elapsed() < RETRY_INTERVAL {
                    return Err(ArpError::NegativeCache);
                }
                let waiter = self.send_request(ip, MacAddress::BROADCAST)?;
                self.await_response(ip, &waiter)
            }
        }
    }

    /// Sends a Request with sender IP = target IP = own IP. Any reply
    /// means another host claims this address.
    pub fn send_garp(&self) -> Result<Arc<Waiter>, ArpError> {
        let own_ip = self.0.own_ip;
        let (waiter, should_send) = {
            let mut inner = self.0.inner.lock().unwrap();
            match inner.pending.get(&own_ip) {
                Some(waiter) => (waiter.clone(), false),
                None => {
                    let waiter = Arc::new(Waiter::new());
                    inner.pending.insert(own_ip, waiter.clone());
                    (waiter, true)
                }
            }
        };
        if !should_send {
            return Ok(waiter);
        }

        match self.send_arp(own_ip, MacAddress::BROADCAST, MacAddress::ZERO, Operation::Request) {
            Ok(()) => Ok(waiter),
            Err(err) => {
                let mut inner = self.0.inner.lock().unwrap();
                close_pending_locked(&mut inner, own_ip);
                Err(err)
            }
        }
    }

    /// Waits up to `RESOLVE_TIMEOUT` for `waiter` to close, then resolves
    /// the outcome against the table. Own-IP waits are interpreted as the
    /// GARP-conflict protocol: a close means someone answered, which is a
    /// conflict; a timeout means nobody contested the address.
    pub fn await_response(&self, ip: Ipv4Address, waiter: &Waiter) -> Result<MacAddress, ArpError> {
        let closed = waiter.wait(RESOLVE_TIMEOUT);
        let own_ip = self.0.own_ip;

        if closed {
            if ip == own_ip {
                return Err(ArpError::IpConflict);
            }
            let inner = self.0.inner.lock().unwrap();
            return match inner.table.get(&ip) {
                Some(entry) if entry.state == EntryState::Reachable => Ok(entry.mac),
                _ => Err(ArpError::HostUnreachable),
            };
        }

        if ip == own_ip {
            return Ok(MacAddress::ZERO);
        }

        let mut inner = self.0.inner.lock().unwrap();
        if matches!(inner.table.get(&ip), Some(e) if e.state == EntryState::Pending) {
            update_entry_locked(&mut inner, ip, EntryState::Failed, MacAddress::ZERO);
        }
        Err(ArpError::HostUnreachable)
    }

    // ---- receive path -----------------------------------------------------

    pub fn receive(&self, wire: &[u8]) -> Result<(), ArpError> {
        let packet = match ArpPacket::deserialize(wire) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::warn!(%err, "dropping malformed ARP packet");
                return Ok(());
            }
        };

        match packet.operation {
            Operation::Request => self.handle_request(packet),
            Operation::Response => self.handle_response(packet),
        }
    }

    fn handle_request(&self, packet: ArpPacket) -> Result<(), ArpError> {
        let sender_ip = packet.sender_proto;
        let target_ip = packet.target_proto;

        if sender_ip == self.0.own_ip {
            tracing::info!(%sender_ip, "another host is probing our IP, defending");
            return self.defend();
        }

        let conflicting = {
            let mut inner = self.0.inner.lock().unwrap();
            match inner.table.get_mut(&sender_ip) {
                Some(entry) if entry.mac != packet.sender_hw => {
                    Some((entry.mac, entry.state))
                }
                Some(entry) => {
                    // Confirms the cached MAC: refreshes a Reachable entry and
                    // also pulls a Stale entry back to Reachable.
                    entry.last_updated = Instant::now();
                    entry.state = EntryState::Reachable;
                    None
                }
                None => {
                    let mut entry = ArpEntry::new(packet.sender_hw, EntryState::Reachable);
                    entry.last_updated = Instant::now();
                    inner.table.insert(sender_ip, entry);
                    tracing::debug!(%sender_ip, mac = %packet.sender_hw, "learned ARP entry");
                    None
                }
            }
        };

        if let Some((cached_mac, cached_state)) = conflicting {
            tracing::info!(%sender_ip, old = %cached_mac, new = %packet.sender_hw, "ARP conflict observed");
            let module = self.clone();
            let new_mac = packet.sender_hw;
            thread::spawn(move || module.handle_conflict(sender_ip, cached_mac, cached_state, new_mac));
        }

        if target_ip == self.0.own_ip {
            self.send_response(sender_ip, packet.sender_hw)?;
        }
        Ok(())
    }

    fn handle_response(&self, packet: ArpPacket) -> Result<(), ArpError> {
        let sender_ip = packet.sender_proto;
        let target_ip = packet.target_proto;

        if sender_ip == self.0.own_ip {
            return self.defend();
        }
        if target_ip != self.0.own_ip {
            return Ok(());
        }

        let should_update = {
            let inner = self.0.inner.lock().unwrap();
            matches!(inner.table.get(&sender_ip), Some(e) if e.state == EntryState::Pending)
                && inner.pending.contains_key(&sender_ip)
        };
        if !should_update {
            return Ok(());
        }

        self.update_entry(sender_ip, EntryState::Reachable, packet.sender_hw);
        Ok(())
    }

    /// Runs on its own thread when a Request or Response arrives
    /// announcing a different MAC than the one cached for an IP.
    fn handle_conflict(
        &self,
        ip: Ipv4Address,
        cached_mac: MacAddress,
        cached_state: EntryState,
        new_mac: MacAddress,
    ) {
        match cached_state {
            EntryState::Reachable | EntryState::Stale => {
                tracing::info!(%ip, %cached_mac, "verifying previous owner before overwriting");
                let waiter = match self.send_request(ip, cached_mac) {
                    Ok(waiter) => waiter,
                    Err(err) => {
                        tracing::warn!(%err, "could not send conflict verification request");
                        return;
                    }
                };
                if self.await_response(ip, &waiter).is_err() {
                    self.install_if_failed(ip, new_mac);
                }
            }
            EntryState::Pending => {
                let waiter = self.0.inner.lock().unwrap().pending.get(&ip).cloned();
                let Some(waiter) = waiter else {
                    return;
                };
                if self.await_response(ip, &waiter).is_err() {
                    self.install_if_failed(ip, new_mac);
                }
            }
            EntryState::Failed => {
                self.update_entry(ip, EntryState::Reachable, new_mac);
            }
        }
    }

    /// The conflict handler's final step: only install the new binding if
    /// the entry is still there and still `Failed` — a compare-and-set
    /// against the entry's identity so a handler that lost the race (or
    /// whose entry was evicted by GC mid-wait) steps aside instead of
    /// clobbering newer state.
    fn install_if_failed(&self, ip: Ipv4Address, new_mac: MacAddress) {
        let mut inner = self.0.inner.lock().unwrap();
        if matches!(inner.table.get(&ip), Some(e) if e.state == EntryState::Failed) {
            update_entry_locked(&mut inner, ip, EntryState::Reachable, new_mac);
        }
    }

    // ---- defense -----------------------------------------------------

    fn defend(&self) -> Result<(), ArpError> {
        {
            let mut inner = self.0.inner.lock().unwrap();
            if inner.last_defense.elapsed() > DEFEND_INTERVAL {
                inner.defend_attempt = 0;
            }
            inner.defend_attempt += 1;
            inner.last_defense = Instant::now();
            if inner.defend_attempt > MAX_DEFENSES {
                return Err(ArpError::MaxDefensesReached);
            }
        }

        self.send_garp()?;

        let mut inner = self.0.inner.lock().unwrap();
        close_pending_locked(&mut inner, self.0.own_ip);
        Ok(())
    }

    // ---- sending -----------------------------------------------------

    fn send_arp(
        &self,
        target_ip: Ipv4Address,
        dst_mac_frame: MacAddress,
        target_hw: MacAddress,
        operation: Operation,
    ) -> Result<(), ArpError> {
        let packet = ArpPacket::ethernet_ipv4(
            operation,
            self.0.own_mac,
            self.0.own_ip,
            target_hw,
            target_ip,
        );
        let wire = packet.serialize();
        self.0
            .sender
            .send_to_mac(&wire, dst_mac_frame, ARP_ETHER_TYPE)?;
        Ok(())
    }

    fn send_response(&self, ip: Ipv4Address, mac: MacAddress) -> Result<(), ArpError> {
        self.send_arp(ip, mac, mac, Operation::Response)
    }

    /// Single-flights a Request: joins an in-flight wait for `ip` if one
    /// exists, otherwise registers a fresh Pending entry and sends the
    /// frame to `dst_mac_frame` (broadcast for ordinary resolution, the
    /// previously-cached MAC for conflict verification).
    fn send_request(&self, ip: Ipv4Address, dst_mac_frame: MacAddress) -> Result<Arc<Waiter>, ArpError> {
        let (waiter, should_send) = {
            let mut inner = self.0.inner.lock().unwrap();
            match inner.pending.get(&ip) {
                Some(waiter) => (waiter.clone(), false),
                None => {
                    let waiter = Arc::new(Waiter::new());
                    inner.pending.insert(ip, waiter.clone());
                    let mut entry = ArpEntry::new(MacAddress::ZERO, EntryState::Pending);
                    entry.last_attempted = Instant::now();
                    inner.table.insert(ip, entry);
                    (waiter, true)
                }
            }
        };
        if !should_send {
            return Ok(waiter);
        }

        match self.send_arp(ip, dst_mac_frame, dst_mac_frame, Operation::Request) {
            Ok(()) => Ok(waiter),
            Err(err) => {
                let mut inner = self.0.inner.lock().unwrap();
                close_pending_locked(&mut inner, ip);
                if let Some(entry) = inner.table.get_mut(&ip) {
                    entry.state = EntryState::Failed;
                }
                Err(err)
            }
        }
    }

    fn update_entry(&self, ip: Ipv4Address, state: EntryState, mac: MacAddress) {
        let mut inner = self.0.inner.lock().unwrap();
        update_entry_locked(&mut inner, ip, state, mac);
    }

    // ---- garbage collection -----------------------------------------------

    /// Spawns the periodic GC thread and returns its handle so the host
    /// binary can decide whether to join it (it never naturally returns
    /// unless the module's `Arc` count and the process both outlive it).
    pub fn spawn_gc(&self) -> thread::JoinHandle<()> {
        let module = self.clone();
        thread::spawn(move || loop {
            thread::sleep(GC_TICK);
            module.run_gc_once();
        })
    }

    pub fn run_gc_once(&self) {
        let mut inner = self.0.inner.lock().unwrap();
        let now = Instant::now();

        let expired: Vec<Ipv4Address> = inner
            .table
            .iter()
            .filter(|(_, entry)| {
                now.duration_since(entry.last_used) > TIME_TO_DELETE
                    || (entry.state == EntryState::Failed
                        && now.duration_since(entry.last_updated) > TIME_TO_DELETE)
            })
            .map(|(ip, _)| *ip)
            .collect();

        for ip in expired {
            inner.table.remove(&ip);
            close_pending_locked(&mut inner, ip);
        }

        for entry in inner.table.values_mut() {
            if entry.state == EntryState::Reachable
                && now.duration_since(entry.last_updated) > TIME_TO_STALE
            {
                entry.state = EntryState::Stale;
            }
        }
    }
}

fn close_pending_locked(inner: &mut Inner, ip: Ipv4Address) {
    if let Some(waiter) = inner.pending.remove(&ip) {
        waiter.close();
    }
}

fn update_entry_locked(inner: &mut Inner, ip: Ipv4Address, state: EntryState, mac: MacAddress) {
    close_pending_locked(inner, ip);
    let entry = inner
        .table
        .entry(ip)
        .or_insert_with(|| ArpEntry::new(MacAddress::ZERO, state));
    match state {
        EntryState::Reachable => {
            entry.mac = mac;
            entry.state = EntryState::Reachable;
            entry.last_updated = Instant::now();
        }
        EntryState::Failed => entry.state = EntryState::Failed,
        EntryState::Stale => entry.state = EntryState::Stale,
        EntryState::Pending => {
            entry.state = EntryState::Pending;
            entry.last_attempted = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct RecordingSender {
        sent: Arc<StdMutex<Vec<(MacAddress, u16, ArpPacket)>>>,
        request_count: Arc<AtomicUsize>,
    }

    impl FrameSender for RecordingSender {
        fn send_to_mac(
            &self,
            message: &[u8],
            dst_mac: MacAddress,
            ether_type: u16,
        ) -> Result<(), SendFrameError> {
            let packet = ArpPacket::deserialize(message).expect("valid ARP packet");
            if packet.operation == Operation::Request {
                self.request_count.fetch_add(1, Ordering::SeqCst);
            }
            self.sent.lock().unwrap().push((dst_mac, ether_type, packet));
            Ok(())
        }
    }

    /// Builds a module with a fresh recording sender and hands back the
    /// counters so a test can assert on what was actually sent, not just on
    /// the resolver's return value.
    fn module_with(own_ip: [u8; 4]) -> (ArpModule, Arc<AtomicUsize>) {
        let own_mac = MacAddress([2, 0, 0, 0, 0, 1]);
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let request_count = Arc::new(AtomicUsize::new(0));
        let sender = RecordingSender {
            sent,
            request_count: request_count.clone(),
        };
        let module = ArpModule::new(own_mac, Ipv4Address(own_ip), Box::new(sender));
        (module, request_count)
    }

    #[test]
    fn resolve_on_miss_sends_broadcast_request_and_times_out() {
        let (module, _) = module_with([10, 0, 0, 1]);
        let result = module.resolve(Ipv4Address([10, 0, 0, 2]));
        assert!(matches!(result, Err(ArpError::HostUnreachable)));
        let entry = module.lookup(Ipv4Address([10, 0, 0, 2])).unwrap();
        assert_eq!(entry.state, EntryState::Failed);
    }

    #[test]
    fn negative_cache_blocks_immediate_retry() {
        let (module, _) = module_with([10, 0, 0, 1]);
        let target = Ipv4Address([10, 0, 0, 2]);
        assert!(module.resolve(target).is_err());
        assert!(matches!(module.resolve(target), Err(ArpError::NegativeCache)));
    }

    #[test]
    fn single_flight_two_concurrent_resolves_share_one_request() {
        let (module, request_count) = module_with([10, 0, 0, 1]);
        let target = Ipv4Address([10, 0, 0, 9]);

        let m1 = module.clone();
        let m2 = module.clone();
        let h1 = thread::spawn(move || m1.resolve(target));
        let h2 = thread::spawn(move || m2.resolve(target));
        let r1 = h1.join().unwrap();
        let r2 = h2.join().unwrap();
        assert!(matches!(r1, Err(ArpError::HostUnreachable)));
        assert!(matches!(r2, Err(ArpError::HostUnreachable)));
        assert_eq!(request_count.load(Ordering::SeqCst), 1, "only one Request should go out for two racing resolvers");
    }

    #[test]
    fn receiving_response_resolves_pending_entry() {
        let (module, _) = module_with([10, 0, 0, 1]);
        let target = Ipv4Address([10, 0, 0, 5]);
        let target_mac = MacAddress([9, 9, 9, 9, 9, 9]);

        let resolver = module.clone();
        let handle = thread::spawn(move || resolver.resolve(target));
        thread::sleep(Duration::from_millis(20));

        let response = ArpPacket::ethernet_ipv4(
            Operation::Response,
            target_mac,
            target,
            module.own_mac(),
            module.own_ip(),
        );
        module.receive(&response.serialize()).unwrap();

        assert_eq!(handle.join().unwrap().unwrap(), target_mac);
        let entry = module.lookup(target).unwrap();
        assert_eq!(entry.state, EntryState::Reachable);
    }

    #[test]
    fn gc_evicts_entries_idle_past_time_to_delete() {
        let (module, _) = module_with([10, 0, 0, 1]);
        let target = Ipv4Address([10, 0, 0, 7]);
        module.update_entry(target, EntryState::Reachable, MacAddress([1, 1, 1, 1, 1, 1]));
        {
            let mut inner = module.0.inner.lock().unwrap();
            let entry = inner.table.get_mut(&target).unwrap();
            entry.last_used = Instant::now() - TIME_TO_DELETE - Duration::from_secs(1);
        }
        module.run_gc_once();
        assert!(module.lookup(target).is_none());
    }

    #[test]
    fn gc_marks_reachable_entries_stale_after_window() {
        let (module, _) = module_with([10, 0, 0, 1]);
        let target = Ipv4Address([10, 0, 0, 8]);
        module.update_entry(target, EntryState::Reachable, MacAddress([1, 1, 1, 1, 1, 1]));
        {
            let mut inner = module.0.inner.lock().unwrap();
            let entry = inner.table.get_mut(&target).unwrap();
            entry.last_updated = Instant::now() - TIME_TO_STALE - Duration::from_secs(1);
            entry.last_used = Instant::now();
        }
        module.run_gc_once();
        assert_eq!(module.lookup(target).unwrap().state, EntryState::Stale);
    }

    #[test]
    fn stale_entry_resolves_without_sending_a_request() {
        let (module, request_count) = module_with([10, 0, 0, 1]);
        let target = Ipv4Address([10, 0, 0, 9]);
        let mac = MacAddress([3, 3, 3, 3, 3, 3]);
        module.update_entry(target, EntryState::Reachable, mac);
        {
            let mut inner = module.0.inner.lock().unwrap();
            inner.table.get_mut(&target).unwrap().state = EntryState::Stale;
        }
        assert_eq!(module.resolve(target).unwrap(), mac);
        assert_eq!(request_count.load(Ordering::SeqCst), 0, "a Stale entry must not trigger a new Request");
    }

    #[test]
    fn stale_entry_confirmed_by_request_returns_to_reachable() {
        let (module, _) = module_with([10, 0, 0, 1]);
        let target = Ipv4Address([10, 0, 0, 12]);
        let mac = MacAddress([6, 6, 6, 6, 6, 6]);
        module.update_entry(target, EntryState::Reachable, mac);
        {
            let mut inner = module.0.inner.lock().unwrap();
            let entry = inner.table.get_mut(&target).unwrap();
            entry.state = EntryState::Stale;
        }
        assert_eq!(module.lookup(target).unwrap().state, EntryState::Stale);

        let request = ArpPacket::ethernet_ipv4(
            Operation::Request,
            mac,
            target,
            MacAddress::ZERO,
            Ipv4Address([10, 0, 0, 250]),
        );
        module.receive(&request.serialize()).unwrap();

        let entry = module.lookup(target).unwrap();
        assert_eq!(entry.mac, mac);
        assert_eq!(entry.state, EntryState::Reachable);
    }

    #[test]
    fn defense_fails_after_max_defenses() {
        let (module, _) = module_with([10, 0, 0, 1]);
        for _ in 0..MAX_DEFENSES {
            module.defend().unwrap();
        }
        assert!(matches!(module.defend(), Err(ArpError::MaxDefensesReached)));
    }

    #[test]
    fn request_for_own_ip_triggers_defense() {
        let (module, _) = module_with([10, 0, 0, 1]);
        let request = ArpPacket::ethernet_ipv4(
            Operation::Request,
            MacAddress([7, 7, 7, 7, 7, 7]),
            module.own_ip(),
            MacAddress::ZERO,
            module.own_ip(),
        );
        assert!(module.receive(&request.serialize()).is_ok());
    }
}
