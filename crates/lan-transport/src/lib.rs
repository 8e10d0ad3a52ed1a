//! Length-prefixed message framing over a blocking TCP connection.
//!
//! Every message on the wire is a 16-bit big-endian length followed by
//! exactly that many bytes. Both ends hold the connection open for up to
//! ten minutes of inactivity on a single read or write before giving up —
//! long enough to survive an idle link, short enough to eventually notice
//! a peer that vanished without closing cleanly.
//!
//! A connection is split into independent [`TcpStream`] handles (via
//! `try_clone`) so one thread can block reading while another blocks
//! writing, the way the reference implementation shares one socket
//! between a sender and a receiver goroutine.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub const IO_DEADLINE: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("declared message length {0} is zero or exceeds the maximum of {1}")]
    InvalidLength(u16, u16),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A connected transport endpoint. Cheap to clone — clones share the same
/// underlying socket via `TcpStream::try_clone`, so a sender thread and a
/// receiver thread can each own one independently.
pub struct Connection {
    stream: TcpStream,
}

impl Connection {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Connection, TransportError> {
        let stream = TcpStream::connect(addr)?;
        if let Ok(peer) = stream.peer_addr() {
            tracing::debug!(%peer, "connection established");
        }
        Ok(Connection { stream })
    }

    pub fn from_stream(stream: TcpStream) -> Connection {
        Connection { stream }
    }

    /// A second independent handle to the same socket, for handing to a
    /// companion thread that only ever reads or only ever writes.
    pub fn try_clone(&self) -> Result<Connection, TransportError> {
        Ok(Connection {
            stream: self.stream.try_clone()?,
        })
    }

    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    pub fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        send_message(&mut self.stream, data)
    }

    pub fn receive(&mut self, max_len: u16) -> Result<Vec<u8>, TransportError> {
        receive_message(&mut self.stream, max_len)
    }
}

pub fn send_message(stream: &mut TcpStream, data: &[u8]) -> Result<(), TransportError> {
    if data.is_empty() || data.len() > u16::MAX as usize {
        return Err(TransportError::InvalidLength(data.len() as u16, u16::MAX));
    }
    let length = data.len() as u16;

    stream.set_write_timeout(Some(IO_DEADLINE))?;
    stream.write_all(&length.to_be_bytes())?;
    stream.set_write_timeout(Some(IO_DEADLINE))?;
    stream.write_all(data)?;
    Ok(())
}

pub fn receive_message(stream: &mut TcpStream, max_len: u16) -> Result<Vec<u8>, TransportError> {
    stream.set_read_timeout(Some(IO_DEADLINE))?;
    let mut len_buf = [0u8; 2];
    read_exact_or_closed(stream, &mut len_buf)?;

    let length = u16::from_be_bytes(len_buf);
    if length == 0 || length > max_len {
        return Err(TransportError::InvalidLength(length, max_len));
    }

    let mut buf = vec![0u8; length as usize];
    read_exact_or_closed(stream, &mut buf)?;
    Ok(buf)
}

fn read_exact_or_closed(stream: &mut TcpStream, buf: &mut [u8]) -> Result<(), TransportError> {
    match stream.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
            tracing::debug!("connection closed by peer");
            Err(TransportError::ConnectionClosed)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = listener.accept().unwrap();
        (server, client.join().unwrap())
    }

    #[test]
    fn round_trips_a_message() {
        let (mut server, mut client) = loopback_pair();
        send_message(&mut client, b"hello lan").unwrap();
        let received = receive_message(&mut server, 2048).unwrap();
        assert_eq!(received, b"hello lan");
    }

    #[test]
    fn rejects_message_over_max_len() {
        let (mut server, mut client) = loopback_pair();
        send_message(&mut client, &vec![0u8; 100]).unwrap();
        let err = receive_message(&mut server, 50).unwrap_err();
        assert!(matches!(err, TransportError::InvalidLength(100, 50)));
    }

    #[test]
    fn rejects_empty_message() {
        let (_server, mut client) = loopback_pair();
        let err = send_message(&mut client, &[]).unwrap_err();
        assert!(matches!(err, TransportError::InvalidLength(0, u16::MAX)));
    }

    #[test]
    fn reports_connection_closed_on_clean_shutdown() {
        let (mut server, client) = loopback_pair();
        drop(client);
        let err = receive_message(&mut server, 2048).unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }

    #[test]
    fn connection_clone_allows_independent_send_and_receive_threads() {
        let (server, client) = loopback_pair();
        let mut server_conn = Connection::from_stream(server);
        let mut client_conn = Connection::from_stream(client);
        let mut client_reader = client_conn.try_clone().unwrap();

        let sender = thread::spawn(move || server_conn.send(b"ping"));
        let received = client_reader.receive(2048).unwrap();
        sender.join().unwrap().unwrap();

        assert_eq!(received, b"ping");
        let _ = client_conn;
    }
}
