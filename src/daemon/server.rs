use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};

use super::lifecycle::PidFile;
use crate::config::Config;
use crate::connection::Connection;
use crate::error::ServerError;
use crate::protocol::CommandPacket;
use crate::server::{MinecraftServer, ServerStatus};

/// The daemon: owns every configured server and the control socket.
///
/// Connections are serviced strictly one at a time; a request is fully
/// handled, answered and closed before the next accept. Sequential access
/// to the servers from the control path is load-bearing - only the plugin
/// watchers run outside this loop, and those are guarded by the
/// per-server process lock.
pub struct McRunnerDaemon {
    config: Config,
    servers: BTreeMap<String, Arc<MinecraftServer>>,
}

impl McRunnerDaemon {
    pub fn new(config: Config) -> Self {
        let servers = config
            .servers
            .iter()
            .map(|(name, section)| {
                let server = MinecraftServer::new(name.clone(), section.clone());
                (name.clone(), Arc::new(server))
            })
            .collect();

        Self { config, servers }
    }

    /// Main daemon runloop: accept, handle one request, respond, close.
    /// Only the stop signal ends the loop; a failed connection is logged
    /// and the loop keeps accepting.
    pub async fn run(&self) -> Result<()> {
        let version = env!("CARGO_PKG_VERSION");
        info!("Starting mcrunnerd ({version})...");

        let pid_file = PidFile::new(&self.config.mcrunnerd.pidfile);
        if let Some(pid) = pid_file.is_running() {
            anyhow::bail!("mcrunnerd already running with PID {pid}");
        }
        pid_file.write()?;

        let socket_path = &self.config.mcrunner.url;
        if socket_path.exists() {
            std::fs::remove_file(socket_path).with_context(|| {
                format!("could not remove stale socket {}", socket_path.display())
            })?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path).with_context(|| {
            format!("could not bind control socket {}", socket_path.display())
        })?;

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        info!(
            socket = %socket_path.display(),
            "mcrunnerd ({version}) started."
        );

        loop {
            debug!("awaiting socket connection");
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            if let Err(e) = self.handle_connection(stream).await {
                                error!("Error during socket connection: {e}");
                            }
                        }
                        Err(e) => error!("Error during socket connection: {e}"),
                    }
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT");
                    break;
                }
            }
        }

        info!("Stopping mcrunnerd ({version})...");
        self.stop_all_servers().await;

        if socket_path.exists() {
            std::fs::remove_file(socket_path).ok();
        }
        if let Err(e) = pid_file.remove() {
            warn!("{e:#}");
        }

        info!("mcrunnerd ({version}) stopped.");
        Ok(())
    }

    /// Exactly one request per connection; the connection is closed with
    /// the protocol terminator regardless of the outcome.
    async fn handle_connection(&self, stream: UnixStream) -> Result<()> {
        let mut connection = Connection::new(stream);
        debug!("established socket connection");

        let result = match connection.receive_message().await {
            Ok(Some(data)) => self.dispatch(&data, &mut connection).await,
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };

        debug!("closing socket connection");
        if let Err(e) = connection.finish().await {
            debug!("error closing connection: {e}");
        }

        result.map_err(Into::into)
    }

    /// Routes a decoded packet. Domain failures are reported to the
    /// client and swallowed here; only channel failures escape.
    async fn dispatch(&self, data: &str, connection: &mut Connection) -> io::Result<()> {
        let Some(packet) = CommandPacket::parse(data) else {
            debug!("unroutable command packet: {data:?}");
            return Ok(());
        };

        match packet {
            CommandPacket::Status => self.send_status(connection).await,
            CommandPacket::Start { server } => self.start_server(&server, connection).await,
            CommandPacket::Stop { server } => self.stop_server(&server, connection).await,
            CommandPacket::Restart { server } => {
                self.stop_server(&server, connection).await?;
                self.start_server(&server, connection).await
            }
            CommandPacket::Command { server, command } => {
                self.send_command(&server, &command, connection).await
            }
        }
    }

    /// One `name: State` line per configured server, as a single message.
    async fn send_status(&self, connection: &mut Connection) -> io::Result<()> {
        let mut lines = Vec::with_capacity(self.servers.len());
        for (name, server) in &self.servers {
            lines.push(format!("{name}: {}", server.status().await.as_str()));
        }
        connection.send_message(&lines.join("\n")).await
    }

    async fn start_server(&self, name: &str, connection: &mut Connection) -> io::Result<()> {
        let Some(server) = self.servers.get(name) else {
            return connection
                .send_message(&format!("Minecraft server \"{name}\" not defined"))
                .await;
        };

        match server.start(Some(connection)).await {
            // a start failure has already been reported to the client
            Ok(()) | Err(ServerError::Start(_)) | Err(ServerError::NotRunning) => Ok(()),
            Err(ServerError::Transport(e)) => Err(e),
        }
    }

    async fn stop_server(&self, name: &str, connection: &mut Connection) -> io::Result<()> {
        let Some(server) = self.servers.get(name) else {
            return connection
                .send_message(&format!("Minecraft server \"{name}\" not defined"))
                .await;
        };

        match server.stop(Some(connection)).await {
            // not-running has already been reported to the client
            Ok(()) | Err(ServerError::NotRunning) | Err(ServerError::Start(_)) => Ok(()),
            Err(ServerError::Transport(e)) => Err(e),
        }
    }

    async fn send_command(
        &self,
        name: &str,
        command: &str,
        connection: &mut Connection,
    ) -> io::Result<()> {
        let Some(server) = self.servers.get(name) else {
            return connection
                .send_message(&format!("Minecraft server \"{name}\" not defined"))
                .await;
        };

        info!("Sending command to server \"{name}\": \"{command}\"");

        match server.run_command(command).await {
            Ok(()) => {
                connection
                    .send_message(&format!(
                        "Sent command to Minecraft server \"{name}\": \"{command}\""
                    ))
                    .await
            }
            Err(_) => {
                let message = format!("Minecraft server \"{name}\" not running");
                warn!("{message}");
                connection.send_message(&message).await
            }
        }
    }

    /// Exit hook: try to stop every running server before the daemon
    /// exits.
    async fn stop_all_servers(&self) {
        for (name, server) in &self.servers {
            if server.status().await != ServerStatus::Running {
                continue;
            }
            match server.stop(None).await {
                Ok(()) | Err(ServerError::NotRunning) => {}
                Err(e) => warn!("could not stop server \"{name}\": {e}"),
            }
        }
    }
}
