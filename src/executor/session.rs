// ============================================================================
// File: os-faults/src/executor/session.rs
// ----------------------------------------------------------------------------
// SSH session setup, authentication and command execution for one host.
// ============================================================================

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use ssh2::Session;

use super::HostConnection;
use super::task::shell_quote;
use super::tunnel::Tunnel;

/// Failures while talking to a host
#[derive(Debug, thiserror::Error)]
pub(crate) enum TransportError {
    /// The host could not be reached or refused authentication
    #[error("{0}")]
    Connect(String),

    /// The command could not be run to completion
    #[error("{0}")]
    Command(String),
}

/// SSH authentication methods
#[derive(Debug, Clone)]
pub(crate) enum SshAuth {
    /// Agent-based authentication
    Agent,
    /// Key-based authentication with path to private key
    Key(PathBuf),
    /// Password authentication
    Password(String),
}

impl SshAuth {
    fn from_parts(private_key_file: Option<&str>, password: Option<&str>) -> Self {
        match (private_key_file, password) {
            (Some(key), _) => Self::Key(PathBuf::from(key)),
            (None, Some(password)) => Self::Password(password.to_string()),
            (None, None) => Self::Agent,
        }
    }
}

/// Captured result of a remote command
#[derive(Debug, Clone, Default)]
pub(crate) struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

/// Authenticated session, optionally tunnelled through a jump host
pub(crate) struct HostSession {
    session: Session,
    // Dropped after the session so the bridge outlives the target connection.
    _tunnel: Option<Tunnel>,
}

impl HostSession {
    /// Connect and authenticate according to `conn`
    pub fn open(conn: &HostConnection) -> Result<Self, TransportError> {
        let target_auth =
            SshAuth::from_parts(conn.private_key_file.as_deref(), conn.password.as_deref());

        let (tcp, tunnel) = match &conn.jump {
            Some(jump) => {
                let jump_user = jump.username.as_deref().unwrap_or(&conn.username);
                let jump_auth = match &jump.private_key_file {
                    Some(key) => SshAuth::Key(PathBuf::from(key)),
                    None => target_auth.clone(),
                };
                let jump_tcp = connect_tcp(&jump.host, conn.port, conn.connect_timeout)?;
                let jump_session =
                    authenticate(jump_tcp, jump_user, &jump_auth, conn.connect_timeout)?;
                let tunnel = Tunnel::open(jump_session, &conn.address, conn.port)?;
                let tcp = TcpStream::connect(tunnel.local_addr()).map_err(|e| {
                    TransportError::Connect(format!("Tunnel connection failed: {e}"))
                })?;
                (tcp, Some(tunnel))
            }
            None => (
                connect_tcp(&conn.address, conn.port, conn.connect_timeout)?,
                None,
            ),
        };

        let session = authenticate(tcp, &conn.username, &target_auth, conn.connect_timeout)?;
        Ok(Self {
            session,
            _tunnel: tunnel,
        })
    }

    /// Run `script`, escalating privileges when the connection asks for it
    pub fn run(&self, conn: &HostConnection, script: &str) -> Result<CommandOutput, TransportError> {
        if !conn.r#become {
            return self.exec(script, None, false);
        }

        match conn.become_method.as_str() {
            "su" => {
                let command = format!("su -c {}", shell_quote(script));
                let input = conn.become_password.as_ref().map(|p| format!("{p}\n"));
                self.exec(&command, input.as_deref(), true)
            }
            _ => match &conn.become_password {
                Some(password) => {
                    let command = format!("sudo -S -p '' sh -c {}", shell_quote(script));
                    self.exec(&command, Some(&format!("{password}\n")), false)
                }
                None => {
                    let command = format!("sudo -n sh -c {}", shell_quote(script));
                    self.exec(&command, None, false)
                }
            },
        }
    }

    fn exec(
        &self,
        command: &str,
        stdin: Option<&str>,
        pty: bool,
    ) -> Result<CommandOutput, TransportError> {
        let command_err = |what: &str, e: ssh2::Error| TransportError::Command(format!("{what}: {e}"));
        let io_err = |what: &str, e: std::io::Error| TransportError::Command(format!("{what}: {e}"));

        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| command_err("Failed to create SSH channel", e))?;

        if pty {
            channel
                .request_pty("xterm", None, None)
                .map_err(|e| command_err("Failed to request pty", e))?;
        }

        channel
            .exec(command)
            .map_err(|e| command_err("Failed to execute command", e))?;

        if let Some(input) = stdin {
            channel
                .write_all(input.as_bytes())
                .map_err(|e| io_err("Failed to write stdin", e))?;
            channel
                .send_eof()
                .map_err(|e| command_err("Failed to send EOF", e))?;
        }

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| io_err("Failed to read command output", e))?;

        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| io_err("Failed to read command errors", e))?;

        channel
            .wait_close()
            .map_err(|e| command_err("Failed to wait for channel close", e))?;

        let exit_status = channel
            .exit_status()
            .map_err(|e| command_err("Failed to get exit status", e))?;

        Ok(CommandOutput {
            stdout: stdout.trim_end().to_string(),
            stderr: stderr.trim_end().to_string(),
            exit_status,
        })
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, TransportError> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| TransportError::Connect(format!("Cannot resolve {host}: {e}")))?;

    let mut last_error = format!("No address found for {host}");
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = format!("TCP connection to {addr} failed: {e}"),
        }
    }
    Err(TransportError::Connect(last_error))
}

fn authenticate(
    tcp: TcpStream,
    username: &str,
    auth: &SshAuth,
    timeout: Duration,
) -> Result<Session, TransportError> {
    let connect_err = |what: &str, e: ssh2::Error| TransportError::Connect(format!("{what}: {e}"));

    let mut session =
        Session::new().map_err(|e| connect_err("SSH session creation failed", e))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session
        .handshake()
        .map_err(|e| connect_err("SSH handshake failed", e))?;

    match auth {
        SshAuth::Agent => session
            .userauth_agent(username)
            .map_err(|e| connect_err("SSH agent auth failed", e))?,
        SshAuth::Key(key_path) => session
            .userauth_pubkey_file(username, None, key_path, None)
            .map_err(|e| connect_err("SSH key auth failed", e))?,
        SshAuth::Password(password) => session
            .userauth_password(username, password)
            .map_err(|e| connect_err("SSH password auth failed", e))?,
    }

    if !session.authenticated() {
        return Err(TransportError::Connect(
            "SSH authentication failed".to_string(),
        ));
    }

    // Commands such as freeze helpers may legitimately run long.
    session.set_timeout(0);
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_takes_precedence_over_password() {
        assert!(matches!(
            SshAuth::from_parts(Some("/root/.ssh/id_rsa"), Some("secret")),
            SshAuth::Key(_)
        ));
        assert!(matches!(
            SshAuth::from_parts(None, Some("secret")),
            SshAuth::Password(_)
        ));
        assert!(matches!(SshAuth::from_parts(None, None), SshAuth::Agent));
    }

    #[test]
    fn unresolvable_host_is_a_connect_error() {
        let err = connect_tcp("host.invalid.", 22, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
