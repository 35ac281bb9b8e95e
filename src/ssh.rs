// src/ssh.rs
//! SSH command channel
//!
//! Runs status queries and scenario commands on the test VM. One session is
//! opened per target and reused for every command of a run; each command gets
//! its own channel.

use ssh2::{Channel, Session};
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SshConfig;
use crate::constants::{
    DEFAULT_SSH_KEY_PATH, DEFAULT_SSH_PORT, FALLBACK_SSH_USER, SSH_READ_IDLE_SLEEP,
};
use crate::error::ExecError;
use crate::executor::{CommandExecutor, CommandOutput};

/// SSH session wrapper
pub struct SshSession {
    session: Session,
    host: String,
}

impl SshSession {
    /// Connect to remote host via SSH and authenticate with a key file
    pub fn connect(host: &str, ssh_config: &SshConfig) -> Result<Self, ExecError> {
        let user = ssh_config.user.clone().unwrap_or_else(|| {
            std::env::var("USER").unwrap_or_else(|_| FALLBACK_SSH_USER.to_string())
        });

        let addr = if host.contains(':') {
            host.to_string()
        } else {
            format!("{}:{}", host, DEFAULT_SSH_PORT)
        };
        let endpoint = format!("{}@{}", user, addr);

        info!("Connecting to {}", endpoint);

        let connect_err = |reason: String| ExecError::Connect {
            target: endpoint.clone(),
            reason,
        };

        let sock = addr
            .to_socket_addrs()
            .map_err(|e| connect_err(e.to_string()))?
            .next()
            .ok_or_else(|| connect_err("address resolved to nothing".to_string()))?;

        let tcp = TcpStream::connect_timeout(&sock, Duration::from_secs(ssh_config.timeout))
            .map_err(|e| connect_err(e.to_string()))?;

        let mut sess = Session::new().map_err(|e| connect_err(e.to_string()))?;
        sess.set_tcp_stream(tcp);
        sess.set_timeout((ssh_config.timeout * 1000) as u32); // milliseconds
        sess.handshake().map_err(|e| connect_err(e.to_string()))?;

        let auth_err = |reason: String| ExecError::Auth {
            target: endpoint.clone(),
            reason,
        };

        let key_path = ssh_config
            .key_path
            .as_deref()
            .unwrap_or(DEFAULT_SSH_KEY_PATH);
        let expanded_key = shellexpand::tilde(key_path);
        let key_file = Path::new(expanded_key.as_ref());

        if !key_file.exists() {
            return Err(auth_err(format!("SSH key not found: {}", key_file.display())));
        }

        debug!("Authenticating with key: {}", key_file.display());
        sess.userauth_pubkey_file(&user, None, key_file, None)
            .map_err(|e| auth_err(e.to_string()))?;

        if !sess.authenticated() {
            return Err(auth_err("session not authenticated".to_string()));
        }

        info!("SSH connected to {}", endpoint);

        Ok(SshSession {
            session: sess,
            host: endpoint,
        })
    }

    /// Read stdout and stderr of a channel alternately until both hit EOF.
    /// The session must be in non-blocking mode.
    fn drain(channel: &mut Channel) -> std::io::Result<(Vec<u8>, Vec<u8>)> {
        let mut stderr_stream = channel.stderr();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut buf = [0u8; 8192];

        while !(stdout_done && stderr_done) {
            let mut progressed = false;

            if !stdout_done {
                match channel.read(&mut buf) {
                    Ok(0) => stdout_done = true,
                    Ok(n) => {
                        stdout.extend_from_slice(&buf[..n]);
                        progressed = true;
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e),
                }
            }

            if !stderr_done {
                match stderr_stream.read(&mut buf) {
                    Ok(0) => stderr_done = true,
                    Ok(n) => {
                        stderr.extend_from_slice(&buf[..n]);
                        progressed = true;
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e),
                }
            }

            if !progressed {
                std::thread::sleep(SSH_READ_IDLE_SLEEP);
            }
        }

        Ok((stdout, stderr))
    }

    fn spawn_err(&self, command: &str, reason: impl std::fmt::Display) -> ExecError {
        ExecError::Spawn {
            target: self.host.clone(),
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl CommandExecutor for SshSession {
    fn execute(&self, command: &str) -> Result<CommandOutput, ExecError> {
        debug!("SSH exec on {}: {}", self.host, command);

        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| self.spawn_err(command, e))?;
        channel.exec(command).map_err(|e| self.spawn_err(command, e))?;

        // Non-blocking while draining so a chatty stderr cannot stall stdout
        self.session.set_blocking(false);
        let drained = Self::drain(&mut channel);
        self.session.set_blocking(true);
        let (stdout, stderr) = drained.map_err(|e| self.spawn_err(command, e))?;

        channel.wait_close().map_err(|e| self.spawn_err(command, e))?;
        let exit_status = channel
            .exit_status()
            .map_err(|e| self.spawn_err(command, e))?;

        Ok(CommandOutput::from_bytes(&stdout, &stderr, exit_status))
    }

    fn target(&self) -> String {
        self.host.clone()
    }
}
