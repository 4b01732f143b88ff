//! One-way status link to the watchdog process that drives the status LED.
//!
//! Reporting is best effort: the recorder must keep running whether or not the
//! watchdog is listening.

use std::io::{ErrorKind, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::sync::Mutex;
use std::time::Duration;

pub const WATCHDOG_PORT: u16 = 5505;

/// Recorder states understood by the watchdog. The discriminants are the
/// on-wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DashcamState {
    Dead = 0,
    Error = 1,
    Starting = 2,
    Recording = 3,
    FallingBehind = 4,
    Converting = 5,
    Uploading = 6,
}

impl DashcamState {
    /// Wire form of a report: the state byte followed by a newline.
    pub fn encode(self) -> [u8; 2] {
        [self as u8, b'\n']
    }
}

pub trait Report: Send + Sync {
    fn report(&self, state: DashcamState);
}

/// Reporter used when no watchdog is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStatus;

impl Report for NoStatus {
    fn report(&self, _state: DashcamState) {}
}

pub struct StatusLink {
    socket: Mutex<Option<TcpStream>>,
}

impl StatusLink {
    /// Connects to the watchdog on localhost. A missing listener is logged and
    /// leaves the link disconnected; reports are then dropped.
    pub fn connect(port: u16) -> Self {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let socket = match TcpStream::connect_timeout(&addr, Duration::from_secs(1)) {
            Ok(stream) => match stream.set_nonblocking(true) {
                Ok(()) => {
                    log::info!("connected to watchdog on {}", addr);
                    Some(stream)
                }
                Err(e) => {
                    log::warn!("failed to make watchdog socket non-blocking: {}", e);
                    None
                }
            },
            Err(e) => {
                log::warn!("failed to connect to watchdog service on {}: {}", addr, e);
                None
            }
        };
        Self {
            socket: Mutex::new(socket),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            socket: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.socket
            .lock()
            .map(|socket| socket.is_some())
            .unwrap_or(false)
    }
}

impl Report for StatusLink {
    fn report(&self, state: DashcamState) {
        let Ok(mut socket) = self.socket.lock() else {
            return;
        };
        let Some(stream) = socket.as_mut() else {
            return;
        };
        match stream.write(&state.encode()) {
            Ok(_) => log::debug!("reported state {:?}", state),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => log::warn!("failed to set status state {:?}: {}", state, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn test_state_wire_values() {
        assert_eq!(DashcamState::Dead.encode(), [0, b'\n']);
        assert_eq!(DashcamState::Error.encode(), [1, b'\n']);
        assert_eq!(DashcamState::Recording.encode(), [3, b'\n']);
        assert_eq!(DashcamState::Uploading.encode(), [6, b'\n']);
    }

    #[test]
    fn test_link_without_listener_is_noop() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            listener.local_addr().unwrap().port()
        };
        let link = StatusLink::connect(port);
        assert!(!link.is_connected());
        link.report(DashcamState::Recording);
    }

    #[test]
    fn test_link_sends_state_bytes() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let link = StatusLink::connect(port);
        let (mut peer, _) = listener.accept().unwrap();
        assert!(link.is_connected());

        link.report(DashcamState::Starting);
        link.report(DashcamState::FallingBehind);

        let mut buf = [0u8; 4];
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [2, b'\n', 4, b'\n']);
    }
}
