//! The host binary's composition root: one simulated computer on the LAN.
//! Owns a NIC descriptor ring, an ARP module, and (while connected) a
//! sender thread that handles operator-driven traffic and a receiver
//! thread that plays both the NIC's "load into memory" role and the
//! CPU's "drain and dispatch" role, since there is no interrupt to
//! separate them on a single blocking socket.

mod frame_sender;
mod prompt;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lan_address::{Ipv4Address, MacAddress};
use lan_arp::{ArpError, ArpModule};
use lan_ethernet::{Frame, ARP_ETHER_TYPE, IPV4_ETHER_TYPE, MAX_PAYLOAD, MIN_FRAME, MTU};
use lan_nic::NicRing;
use lan_transport::{Connection, TransportError};

pub use frame_sender::TransportFrameSender;
pub use prompt::Prompter;

pub const SLOT_SIZE: usize = MTU;
pub const DESCRIPTOR_SLOTS: usize = 64;
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Closes the wrapped connection when dropped, so whichever of the
/// sender/receiver threads exits first unblocks the other's pending
/// socket call — mirroring the reference implementation's symmetric
/// `defer conn.Close()` in both of its goroutines.
struct CloseOnDrop(Connection);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

/// Runs the host for `own_ip` until the operator declines to reconnect.
pub fn run(own_ip: Ipv4Address) -> anyhow::Result<()> {
    let own_mac = MacAddress::from_process_id(std::process::id());
    let ring = Arc::new(NicRing::new(DESCRIPTOR_SLOTS, SLOT_SIZE));
    let mut prompter = Prompter::new(MAX_PAYLOAD as u64);

    loop {
        let addr = match prompter.prompt_string("Enter router address to connect to:") {
            Ok(addr) => addr,
            Err(err) => {
                eprintln!("Could not read input: {err}");
                break;
            }
        };

        let conn = match Connection::connect(addr.trim()) {
            Ok(conn) => conn,
            Err(err) => {
                eprintln!("Could not connect to router: {err}");
                continue;
            }
        };
        tracing::debug!(router = addr.trim(), %own_ip, %own_mac, "connected, spawning sender/receiver threads");

        let writer_conn = conn.try_clone()?;
        let sender = TransportFrameSender::new(writer_conn, own_mac);
        let arp = ArpModule::new(own_mac, own_ip, Box::new(sender.clone()));
        arp.spawn_gc();

        let receiver_conn = conn.try_clone()?;
        let receiver_arp = arp.clone();
        let receiver_ring = ring.clone();
        let receiver_handle =
            thread::spawn(move || receive_loop(receiver_conn, receiver_ring, receiver_arp, own_mac));

        let send_handle = thread::spawn(move || send_loop(arp, sender, prompter, conn));

        let receive_outcome = receiver_handle.join().unwrap_or(ReceiveOutcome::Closed);
        prompter = send_handle.join().expect("sender thread panicked");

        if matches!(receive_outcome, ReceiveOutcome::Fatal) {
            anyhow::bail!("maximum number of IP defenses reached, shutting down");
        }

        let reconnect = match prompter.prompt_string("Enter 1 to reconnect") {
            Ok(answer) => answer,
            Err(err) => {
                eprintln!("Could not read input: {err}");
                break;
            }
        };
        if reconnect.trim() == "1" {
            println!("Reconnecting in {} seconds...", RECONNECT_DELAY.as_secs());
            tracing::debug!(delay_secs = RECONNECT_DELAY.as_secs(), "reconnect requested");
            thread::sleep(RECONNECT_DELAY);
            continue;
        }
        break;
    }

    Ok(())
}

/// How the receiver thread stopped: cleanly (peer closed, I/O error) or
/// because `MaxDefensesReached` fired, which must surface as a non-zero
/// process exit rather than a quiet reconnect prompt.
enum ReceiveOutcome {
    Closed,
    Fatal,
}

fn receive_loop(conn: Connection, ring: Arc<NicRing>, arp: ArpModule, own_mac: MacAddress) -> ReceiveOutcome {
    let closer = CloseOnDrop(conn.try_clone().expect("clone connection for shutdown guard"));
    let mut conn = conn;
    let mut outcome = ReceiveOutcome::Closed;

    loop {
        let data = match conn.receive(MTU as u16) {
            Ok(data) => data,
            Err(TransportError::ConnectionClosed) => {
                println!("The server closed the connection");
                break;
            }
            Err(err) => {
                eprintln!("Error receiving message: {err}");
                break;
            }
        };

        if !is_for_me(&data, own_mac) {
            continue;
        }

        let slot_index = match ring.load_frame(&data) {
            Ok(index) => index,
            Err(err) => {
                println!("Could not write to memory, dropping frame: {err}");
                continue;
            }
        };
        tracing::trace!(slot = slot_index, "frame staged into NIC ring");
        let data = match ring.read_slot(slot_index) {
            Ok(data) => data,
            Err(err) => {
                println!("Could not read from memory, dropping frame: {err}");
                continue;
            }
        };
        let frame = match Frame::deserialize(&data) {
            Ok(frame) => frame,
            Err(err) => {
                println!("Could not parse frame, dropping frame: {err}");
                continue;
            }
        };

        match dispatch(&frame, &arp) {
            Ok(()) => {}
            Err(ArpError::MaxDefensesReached) => {
                println!("Critical error: {}", ArpError::MaxDefensesReached);
                println!("Shutting down system");
                outcome = ReceiveOutcome::Fatal;
                break;
            }
            Err(err) => println!("Could not dispatch frame: {err}"),
        }
    }

    drop(closer);
    outcome
}

fn is_for_me(data: &[u8], own_mac: MacAddress) -> bool {
    if data.len() < MIN_FRAME {
        println!("Too small frame received, dropping frame");
        return false;
    }
    if data.len() > MTU {
        println!("Invalid frame size received, dropping frame");
        return false;
    }
    let dst_mac = MacAddress(data[0..6].try_into().unwrap());
    if dst_mac != own_mac && !dst_mac.is_broadcast() {
        println!("Wrong destination received, dropping frame");
        return false;
    }
    true
}

fn dispatch(frame: &Frame, arp: &ArpModule) -> Result<(), ArpError> {
    match frame.ether_type {
        IPV4_ETHER_TYPE => {
            println!(
                "Frame received\nDestination: {}\nSource: {}\nEtherType: {}\nPayload: {}\nCRC: {}",
                frame.dst_mac,
                frame.src_mac,
                frame.ether_type,
                String::from_utf8_lossy(&frame.payload),
                frame.fcs
            );
            Ok(())
        }
        ARP_ETHER_TYPE => arp.receive(&frame.payload),
        other => {
            println!("unrecognized ethertype {other}, dropping frame");
            Ok(())
        }
    }
}

fn send_loop(
    arp: ArpModule,
    sender: TransportFrameSender,
    mut prompter: Prompter,
    conn: Connection,
) -> Prompter {
    let closer = CloseOnDrop(conn);

    let waiter = match arp.send_garp() {
        Ok(waiter) => Some(waiter),
        Err(err) => {
            eprintln!("Could not send GARP: {err}");
            None
        }
    };

    if let Some(waiter) = waiter {
        match arp.await_response(arp.own_ip(), &waiter) {
            Ok(_) => {}
            Err(ArpError::IpConflict) => {
                eprintln!("Critical error: {}", ArpError::IpConflict);
                drop(closer);
                return prompter;
            }
            Err(err) => eprintln!("Error awaiting response to GARP: {err}"),
        }

        loop {
            let dst_ip_str = match prompter.prompt_string("Enter destination IP address:") {
                Ok(s) => s,
                Err(err) => {
                    eprintln!("Could not read input: {err}");
                    break;
                }
            };
            let dst_ip: Ipv4Address = match dst_ip_str.trim().parse() {
                Ok(ip) => ip,
                Err(err) => {
                    eprintln!("Could not parse IP address: {err}");
                    continue;
                }
            };

            let mut payload = match prompter.prompt_bytes("Enter payload:") {
                Ok(bytes) => bytes,
                Err(err) => {
                    eprintln!("Could not read input: {err}");
                    break;
                }
            };
            if payload.len() > MAX_PAYLOAD {
                payload.truncate(MAX_PAYLOAD);
            }

            let result = arp
                .resolve(dst_ip)
                .map_err(anyhow::Error::from)
                .and_then(|mac| {
                    sender
                        .send_to_mac(&payload, mac, IPV4_ETHER_TYPE)
                        .map_err(anyhow::Error::from)
                });
            if let Err(err) = result {
                eprintln!("Could not send message to IP: {err}");
            }
        }
    }

    drop(closer);
    prompter
}
