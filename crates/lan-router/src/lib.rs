//! The router: accepts one TCP connection per simulated host and switches
//! raw Ethernet frames between them by source/destination MAC, exactly as
//! a real learning switch would — it never looks past the 12-byte address
//! header, so it never needs to understand ARP, IPv4, or any payload
//! carried inside.

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use lan_address::MacAddress;
use lan_ethernet::MTU;
use lan_switch::{Route, Switch};
use lan_transport::Connection;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Binds `listen_addr` and services connections forever. Never returns
/// under normal operation; a bind failure is the only way out.
pub fn run(listen_addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen_addr)?;
    println!("Server started at: {}", listener.local_addr()?);
    serve(listener);
    Ok(())
}

pub fn serve(listener: TcpListener) {
    let switch = Arc::new(Switch::new());
    loop {
        let (stream, peer_addr) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) => {
                eprintln!("Could not accept connection: {err}");
                continue;
            }
        };
        println!("Connection received from: {peer_addr}");

        let switch = switch.clone();
        thread::spawn(move || service_connection(stream, switch));
    }
}

/// Services a single accepted connection until the peer disconnects or a
/// fatal I/O error occurs, forwarding every frame it carries.
pub fn service_connection(stream: TcpStream, switch: Arc<Switch>) {
    let peer_addr = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    let mut conn = Connection::from_stream(stream);
    let mut learned_mac: Option<MacAddress> = None;

    loop {
        let data = match conn.receive(MTU as u16) {
            Ok(data) => data,
            Err(lan_transport::TransportError::ConnectionClosed) => {
                println!("The client closed the connection");
                break;
            }
            Err(err) => {
                eprintln!("Error receiving message: {err}");
                break;
            }
        };

        if data.len() < 12 {
            eprintln!("Frame too small to carry an address header, dropping frame");
            continue;
        }
        let dst_mac = MacAddress(data[0..6].try_into().unwrap());
        let src_mac = MacAddress(data[6..12].try_into().unwrap());

        if learned_mac != Some(src_mac) {
            match conn.try_clone() {
                Ok(writer) => {
                    switch.learn(src_mac, writer);
                    learned_mac = Some(src_mac);
                }
                Err(err) => {
                    eprintln!("Could not clone connection to learn {src_mac}: {err}");
                }
            }
        }

        let route = match switch.route(src_mac, dst_mac) {
            Ok(route) => route,
            Err(err) => {
                eprintln!("Could not resolve switching table: {err}");
                continue;
            }
        };

        match route {
            Route::Unknown => {
                eprintln!("Unknown MAC address received, dropping frame");
            }
            Route::Unicast(mut target) => match target.send(&data) {
                Ok(()) => println!("Forwarded message from {src_mac} to {dst_mac}"),
                Err(err) => eprintln!("Error forwarding message from {src_mac} to {dst_mac}: {err}"),
            },
            Route::Broadcast(targets) => {
                println!("Broadcasting message from {src_mac}");
                for (target_mac, mut target) in targets {
                    if let Err(err) = target.send(&data) {
                        eprintln!("Error forwarding message from {src_mac} to {target_mac}: {err}");
                    }
                }
            }
        }
    }

    println!("Closing connection to: {peer_addr}");
    if let Some(mac) = learned_mac {
        switch.forget(mac);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lan_ethernet::Frame;
    use std::time::Duration;

    fn spawn_switch() -> (Arc<Switch>, std::net::SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let switch = Arc::new(Switch::new());
        let switch_for_thread = switch.clone();
        thread::spawn(move || serve_once(listener, switch_for_thread, 2));
        (switch, addr)
    }

    fn serve_once(listener: TcpListener, switch: Arc<Switch>, count: usize) {
        for _ in 0..count {
            let (stream, _) = listener.accept().unwrap();
            let switch = switch.clone();
            thread::spawn(move || service_connection(stream, switch));
        }
    }

    #[test]
    fn unicasts_a_frame_between_two_learned_peers() {
        let (_switch, addr) = spawn_switch();

        let mac_a = MacAddress([1, 1, 1, 1, 1, 1]);
        let mac_b = MacAddress([2, 2, 2, 2, 2, 2]);

        let mut conn_a = Connection::connect(addr).unwrap();
        let mut conn_b = Connection::connect(addr).unwrap();

        let mut announce_a = Frame::new(mac_a, MacAddress::BROADCAST, 0x0800, b"hi").unwrap();
        conn_a.send(&announce_a.serialize()).unwrap();
        thread::sleep(Duration::from_millis(50));

        let mut announce_b = Frame::new(mac_b, MacAddress::BROADCAST, 0x0800, b"hi").unwrap();
        conn_b.send(&announce_b.serialize()).unwrap();
        thread::sleep(Duration::from_millis(50));

        let mut to_b = Frame::new(mac_a, mac_b, 0x0800, b"payload").unwrap();
        conn_a.send(&to_b.serialize()).unwrap();

        let received = conn_b.receive(5018).unwrap();
        let frame = Frame::deserialize(&received).unwrap();
        assert_eq!(frame.src_mac, mac_a);
        assert_eq!(frame.dst_mac, mac_b);
    }
}
