//! SSH implementation of the command channel over `ssh2`.
//!
//! `ssh2` is a blocking libssh2 binding, so every operation holds the
//! session behind a mutex and runs on the blocking pool.

use std::io::Read;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use crate::node::Node;

use super::{CommandOutput, Commander, CommanderFactory, OutputMode, RemoteCommand};

const SSH_PORT: u16 = 22;

/// Opens [`SshCommander`] sessions authenticated with a private key file.
#[derive(Debug, Clone)]
pub struct SshCommanderFactory {
    user: String,
    private_key: PathBuf,
}

impl SshCommanderFactory {
    pub fn new(user: impl Into<String>, private_key: impl Into<PathBuf>) -> Self {
        Self {
            user: user.into(),
            private_key: private_key.into(),
        }
    }
}

#[async_trait]
impl CommanderFactory for SshCommanderFactory {
    async fn connect(&self, node: &Node) -> Result<Box<dyn Commander>> {
        let commander = SshCommander::connect(
            node.name.clone(),
            node.status.ip_address.clone(),
            self.user.clone(),
            self.private_key.clone(),
        )
        .await?;
        Ok(Box::new(commander))
    }
}

/// One authenticated SSH session to one node.
pub struct SshCommander {
    node: String,
    session: Arc<Mutex<ssh2::Session>>,
}

impl SshCommander {
    async fn connect(
        node: String,
        address: String,
        user: String,
        private_key: PathBuf,
    ) -> Result<Self> {
        let node_name = node.clone();
        let session = tokio::task::spawn_blocking(move || -> std::result::Result<ssh2::Session, Error> {
            let stream = TcpStream::connect((address.as_str(), SSH_PORT))
                .map_err(|e| Error::connection(&node, e))?;
            let mut session =
                ssh2::Session::new().map_err(|e| Error::connection(&node, e))?;
            session.set_tcp_stream(stream);
            session
                .handshake()
                .map_err(|e| Error::connection(&node, e))?;
            session
                .userauth_pubkey_file(&user, None, &private_key, None)
                .map_err(|e| Error::connection(&node, e))?;
            Ok(session)
        })
        .await
        .map_err(|e| Error::connection(&node_name, std::io::Error::other(e)))??;

        debug!(node = %node_name, "ssh session established");

        Ok(Self {
            node: node_name,
            session: Arc::new(Mutex::new(session)),
        })
    }

    fn exec_blocking(
        session: &Mutex<ssh2::Session>,
        node: &str,
        command: &RemoteCommand,
    ) -> Result<CommandOutput> {
        let session = session.lock().unwrap_or_else(|e| e.into_inner());
        let mut channel = session
            .channel_session()
            .map_err(|e| Error::command(node, &command.line, e))?;
        channel
            .exec(&command.line)
            .map_err(|e| Error::command(node, &command.line, e))?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| Error::command(node, &command.line, e))?;
        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| Error::command(node, &command.line, e))?;

        channel
            .wait_close()
            .map_err(|e| Error::command(node, &command.line, e))?;
        let status = channel
            .exit_status()
            .map_err(|e| Error::command(node, &command.line, e))?;
        if status != 0 {
            return Err(Error::command(
                node,
                &command.line,
                std::io::Error::other(format!("exit status {status}: {}", stderr.trim())),
            ));
        }

        let stdout = match command.output {
            OutputMode::Capture => stdout,
            OutputMode::Discard => {
                if !stdout.is_empty() {
                    debug!(node, command = %command.line, %stdout);
                }
                String::new()
            }
        };

        Ok(CommandOutput {
            command: command.line.clone(),
            stdout,
        })
    }
}

#[async_trait]
impl Commander for SshCommander {
    async fn run(&self, commands: &[RemoteCommand]) -> Result<Vec<CommandOutput>> {
        let mut outputs = Vec::with_capacity(commands.len());

        for command in commands {
            if !command.enabled {
                continue;
            }
            debug!(node = %self.node, command = %command.line, "running remote command");

            let session = Arc::clone(&self.session);
            let node = self.node.clone();
            let command = command.clone();
            let output = tokio::task::spawn_blocking(move || {
                Self::exec_blocking(&session, &node, &command)
            })
            .await
            .map_err(|e| Error::connection(&self.node, std::io::Error::other(e)))??;

            outputs.push(output);
        }

        Ok(outputs)
    }

    async fn download(&self, remote_path: &str, dest: &Path) -> Result<()> {
        let command = RemoteCommand::capture(format!("sudo cat {remote_path}"));
        let mut outputs = self.run(std::slice::from_ref(&command)).await?;
        let output = outputs
            .pop()
            .ok_or_else(|| Error::command(&self.node, &command.line, std::io::Error::other("no output")))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, output.stdout).await?;

        debug!(node = %self.node, remote_path, dest = %dest.display(), "downloaded remote file");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let session = Arc::clone(&self.session);
        let node = self.node.clone();
        tokio::task::spawn_blocking(move || {
            let session = session.lock().unwrap_or_else(|e| e.into_inner());
            // a dropped connection at this point is not an error worth surfacing
            if let Err(e) = session.disconnect(None, "closing", None) {
                debug!(node = %node, error = %e, "ssh disconnect failed");
            }
        })
        .await
        .map_err(|e| Error::connection(&self.node, std::io::Error::other(e)))?;
        Ok(())
    }
}
