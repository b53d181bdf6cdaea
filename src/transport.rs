//! Transport abstraction for the upper layer.
//!
//! The protocol engine does not open connections:
//! it consumes an established bidirectional byte stream
//! through the [`Transport`] trait.
//! A ready-made implementation over [`TcpStream`] is provided,
//! which is how DICOM nodes communicate in practice.
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// A bidirectional byte stream to a peer application entity.
///
/// Implementations are expected to be blocking,
/// with reads bounded by a timeout so that the association reactor
/// can keep servicing its timers.
pub trait Transport: Send {
    /// Send all of the given bytes to the peer.
    fn send(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// Receive exactly `n` bytes from the peer,
    /// blocking up to the configured timeout.
    fn recv(&mut self, n: usize) -> std::io::Result<Vec<u8>>;

    /// Whether bytes are available for reading without blocking.
    ///
    /// A closed or half-closed stream also reports ready,
    /// so that the next read surfaces the closure.
    fn ready(&mut self) -> std::io::Result<bool>;

    /// Close the transport in both directions.
    fn close(&mut self) -> std::io::Result<()>;
}

/// A TCP transport with a bounded read timeout.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// The default socket read timeout.
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

    /// Wrap an established TCP stream,
    /// applying the default read timeout.
    pub fn new(stream: TcpStream) -> std::io::Result<Self> {
        Self::with_read_timeout(stream, Self::DEFAULT_READ_TIMEOUT)
    }

    /// Wrap an established TCP stream with an explicit read timeout.
    pub fn with_read_timeout(stream: TcpStream, timeout: Duration) -> std::io::Result<Self> {
        stream.set_read_timeout(Some(timeout))?;
        Ok(TcpTransport { stream })
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes)
    }

    fn recv(&mut self, n: usize) -> std::io::Result<Vec<u8>> {
        let mut bytes = vec![0; n];
        self.stream.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn ready(&mut self) -> std::io::Result<bool> {
        self.stream.set_nonblocking(true)?;
        let outcome = match self.stream.peek(&mut [0u8; 1]) {
            // n = 0 means the peer has closed its end
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        };
        self.stream.set_nonblocking(false)?;
        outcome
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn ready_reflects_pending_data() {
        let (client, server) = tcp_pair();
        let mut client = TcpTransport::new(client).unwrap();
        let mut server = TcpTransport::new(server).unwrap();

        assert!(!server.ready().unwrap());

        client.send(&[0x05, 0x00, 0x00, 0x00, 0x00, 0x04]).unwrap();
        // wait for delivery
        let mut attempts = 0;
        while !server.ready().unwrap() {
            std::thread::sleep(Duration::from_millis(1));
            attempts += 1;
            assert!(attempts < 1000, "data never became ready");
        }

        let bytes = server.recv(6).unwrap();
        assert_eq!(bytes, &[0x05, 0x00, 0x00, 0x00, 0x00, 0x04]);
    }

    #[test]
    fn recv_times_out_without_data() {
        let (client, server) = tcp_pair();
        let _client = TcpTransport::new(client).unwrap();
        let mut server =
            TcpTransport::with_read_timeout(server, Duration::from_millis(10)).unwrap();

        assert!(server.recv(1).is_err());
    }

    #[test]
    fn closed_peer_reports_ready_and_fails_reads() {
        let (client, server) = tcp_pair();
        let mut client = TcpTransport::new(client).unwrap();
        let mut server = TcpTransport::new(server).unwrap();

        client.close().unwrap();

        let mut attempts = 0;
        while !server.ready().unwrap() {
            std::thread::sleep(Duration::from_millis(1));
            attempts += 1;
            assert!(attempts < 1000, "closure never became visible");
        }
        assert!(server.recv(6).is_err());
    }
}
