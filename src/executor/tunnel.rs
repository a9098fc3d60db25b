// ============================================================================
// File: os-faults/src/executor/tunnel.rs
// ----------------------------------------------------------------------------
// Jump-host forwarding: a direct-tcpip channel bridged to a local socket so a
// second SSH session can run on top of it.
// ============================================================================

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;
use ssh2::{Channel, Session};

use super::session::TransportError;

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Local endpoint forwarding to a host behind a jump host
pub(crate) struct Tunnel {
    local_addr: SocketAddr,
    _pump: JoinHandle<()>,
}

impl Tunnel {
    /// Open a channel from `jump` to `target:port` and expose it locally
    pub fn open(jump: Session, target: &str, port: u16) -> Result<Self, TransportError> {
        let channel = jump
            .channel_direct_tcpip(target, port, None)
            .map_err(|e| {
                TransportError::Connect(format!("Jump host cannot reach {target}:{port}: {e}"))
            })?;

        let listener = TcpListener::bind("127.0.0.1:0")
            .map_err(|e| TransportError::Connect(format!("Cannot bind tunnel socket: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::Connect(format!("Tunnel socket has no address: {e}")))?;

        let target = format!("{target}:{port}");
        let pump = thread::spawn(move || match listener.accept() {
            Ok((stream, _)) => {
                if let Err(e) = pump(&jump, channel, stream) {
                    debug!("Tunnel to {target} closed: {e}");
                }
            }
            Err(e) => debug!("Tunnel to {target} never connected: {e}"),
        });

        Ok(Self {
            local_addr,
            _pump: pump,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

fn pump(session: &Session, mut channel: Channel, mut stream: TcpStream) -> std::io::Result<()> {
    session.set_blocking(false);
    stream.set_nonblocking(true)?;

    let mut buf = vec![0u8; 32 * 1024];
    loop {
        let mut idle = true;

        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                write_fully(&mut channel, &buf[..n])?;
                idle = false;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }

        match channel.read(&mut buf) {
            Ok(0) if channel.eof() => break,
            Ok(0) => {}
            Ok(n) => {
                write_fully(&mut stream, &buf[..n])?;
                idle = false;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }

        if idle {
            thread::sleep(POLL_INTERVAL);
        }
    }

    let _ = channel.close();
    Ok(())
}

fn write_fully<W: Write>(writer: &mut W, mut data: &[u8]) -> std::io::Result<()> {
    while !data.is_empty() {
        match writer.write(data) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(e),
        }
    }
    writer.flush().or_else(|e| {
        if e.kind() == ErrorKind::WouldBlock {
            Ok(())
        } else {
            Err(e)
        }
    })
}
